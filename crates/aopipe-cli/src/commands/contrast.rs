use std::path::PathBuf;

use anyhow::{Context, Result};
use aopipe_core::analysis::estimate_fwhm_default;
use aopipe_core::contrast::compute_contrast_curve;
use aopipe_core::frame::geometric_center;
use aopipe_core::instrument::instrument_for;
use aopipe_core::io::read_fits;
use aopipe_core::pipeline::{ContrastConfig, InstrumentKind};
use clap::{Args, ValueEnum};

use super::parse_center;

#[derive(Clone, Copy, ValueEnum)]
pub enum InstrumentArg {
    Sharcs,
    Pharo,
}

impl From<InstrumentArg> for InstrumentKind {
    fn from(arg: InstrumentArg) -> Self {
        match arg {
            InstrumentArg::Sharcs => InstrumentKind::Sharcs,
            InstrumentArg::Pharo => InstrumentKind::Pharo,
        }
    }
}

#[derive(Args)]
pub struct ContrastArgs {
    /// Stacked, centred image
    pub file: PathBuf,

    /// Stellar FWHM in pixels (estimated from the image when omitted)
    #[arg(long)]
    pub fwhm: Option<f64>,

    /// Instrument that took the data (sets the plate scale)
    #[arg(long, value_enum, default_value = "sharcs")]
    pub instrument: InstrumentArg,

    /// Star position as ROW,COL (defaults to the image centre)
    #[arg(long)]
    pub center: Option<String>,

    /// Write the curve to a CSV file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &ContrastArgs) -> Result<()> {
    let frame = read_fits(&args.file)?
        .into_iter()
        .next()
        .with_context(|| format!("{} holds no image", args.file.display()))?;
    let center = args.center.as_deref().map(parse_center).transpose()?;
    let instrument = instrument_for(args.instrument.into(), None)?;

    let fwhm = match args.fwhm {
        Some(fwhm) => fwhm,
        None => {
            let star = center.unwrap_or_else(|| geometric_center(&frame.data));
            let fwhm = estimate_fwhm_default(&frame.data, star);
            println!("Estimated FWHM: {fwhm:.2} px");
            fwhm
        }
    };

    let curve = compute_contrast_curve(
        &frame.data,
        fwhm,
        instrument.plate_scale(),
        center,
        &ContrastConfig::default(),
    )?;

    println!("{:>8}  {:>8}  {:>8}", "arcsec", "dmag", "dmrms");
    for point in &curve.points {
        println!(
            "{:>8.3}  {:>8.3}  {:>8.3}",
            point.separation, point.delta_mag, point.uncertainty
        );
    }

    if let Some(ref path) = args.output {
        curve.write_csv(path)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}
