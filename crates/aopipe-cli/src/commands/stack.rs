use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Result};
use aopipe_core::align::RegistrationStrategy;
use aopipe_core::io::{read_fits, write_fits};
use aopipe_core::pipeline::{RegistrationConfig, StackConfig};
use aopipe_core::stack::stack_frames;
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use super::parse_center;

#[derive(Clone, Copy, ValueEnum)]
pub enum StackMethodArg {
    /// Threshold peak search
    Default,
    /// Rotational symmetry search for saturated cores
    Saturated,
    /// Gaussian fits sampled across the whole set
    PsfFit,
}

impl From<StackMethodArg> for RegistrationStrategy {
    fn from(arg: StackMethodArg) -> Self {
        match arg {
            StackMethodArg::Default => RegistrationStrategy::Bruteforce,
            StackMethodArg::Saturated => RegistrationStrategy::Saturated,
            StackMethodArg::PsfFit => RegistrationStrategy::PsfFit,
        }
    }
}

#[derive(Args)]
pub struct StackArgs {
    /// Calibrated input frames (FITS files or cubes)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Registration method
    #[arg(long, value_enum, default_value = "saturated")]
    pub method: StackMethodArg,

    /// Rough position of the primary as ROW,COL (wide binaries)
    #[arg(long)]
    pub rough_center: Option<String>,

    /// Half-width of the rotational search grid in pixels
    #[arg(long)]
    pub search_radius: Option<usize>,

    /// Side of the central region kept after stacking (0 keeps all)
    #[arg(long, default_value = "600")]
    pub final_size: usize,

    /// Output file path
    #[arg(short, long, default_value = "final_im.fits")]
    pub output: PathBuf,
}

pub fn run(args: &StackArgs) -> Result<()> {
    let rough_center = args.rough_center.as_deref().map(parse_center).transpose()?;

    let mut header = None;
    let mut frames = Vec::new();
    for path in &args.files {
        for frame in read_fits(path)? {
            header.get_or_insert_with(|| frame.header.clone());
            frames.push(frame.data);
        }
    }
    if frames.is_empty() {
        bail!("no image planes found in the input files");
    }
    println!("Read {} frames from {} files", frames.len(), args.files.len());

    let mut registration = RegistrationConfig::default();
    if let Some(radius) = args.search_radius {
        registration.search_radius = radius;
    }
    let stack = StackConfig {
        final_size: (args.final_size > 0).then_some(args.final_size),
    };
    let strategy = RegistrationStrategy::from(args.method);

    let pb = ProgressBar::new(frames.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Registering [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    let done = AtomicUsize::new(0);
    let result = stack_frames(&frames, strategy, rough_center, &registration, &stack, |_| {
        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
        pb.set_position(n as u64);
    })?;
    pb.finish();

    let fallbacks = result.fallbacks(strategy);
    if fallbacks > 0 {
        println!("{fallbacks} frames fell back to the saturated method");
    }

    write_fits(&args.output, &result.image, &header.unwrap_or_default())?;
    println!("Saved to {}", args.output.display());
    Ok(())
}
