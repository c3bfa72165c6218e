use std::path::PathBuf;

use anyhow::{Context, Result};
use aopipe_core::analysis::analyze_reduced_image;
use aopipe_core::instrument::instrument_for;
use aopipe_core::io::read_fits;
use aopipe_core::pipeline::{AnalysisConfig, ContrastConfig};
use clap::Args;

use super::contrast::InstrumentArg;

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Reduced image (usually final_im.fits)
    pub file: PathBuf,

    /// Instrument that took the data (sets the plate scale)
    #[arg(long, value_enum, default_value = "sharcs")]
    pub instrument: InstrumentArg,

    /// Directory for the CSV outputs (defaults to the image's directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum centre/FWHM refinement passes
    #[arg(long, default_value_t = 10)]
    pub max_iterations: usize,

    /// Centre tolerance in pixels
    #[arg(long, default_value_t = 1.0)]
    pub position_tolerance: f64,

    /// FWHM tolerance in pixels
    #[arg(long, default_value_t = 0.5)]
    pub fwhm_tolerance: f64,
}

pub fn run(args: &AnalyzeArgs) -> Result<()> {
    let frame = read_fits(&args.file)?
        .into_iter()
        .next()
        .with_context(|| format!("{} holds no image", args.file.display()))?;
    let instrument = instrument_for(args.instrument.into(), None)?;
    let output_dir = match args.output {
        Some(ref dir) => dir.clone(),
        None => args
            .file
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let config = AnalysisConfig {
        max_iterations: args.max_iterations,
        position_tolerance: args.position_tolerance,
        fwhm_tolerance: args.fwhm_tolerance,
        ..AnalysisConfig::default()
    };
    let filename = args.file.display().to_string();
    let (analysis, curve) = analyze_reduced_image(
        &frame.data,
        &filename,
        instrument.plate_scale(),
        &config,
        &ContrastConfig::default(),
        &output_dir,
    )?;

    println!("Centre:      row {:.0}, col {:.0}", analysis.center.row, analysis.center.col);
    println!("FWHM:        {:.2} px", analysis.fwhm);
    println!(
        "Iterations:  {}{}",
        analysis.iterations,
        if analysis.converged { "" } else { " (not converged)" }
    );
    println!("Sources:     {}", analysis.sources.len());
    println!("Curve bins:  {}", curve.len());
    println!("Saved to {}", output_dir.display());
    Ok(())
}
