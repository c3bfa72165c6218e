use std::path::PathBuf;

use anyhow::Result;
use aopipe_core::summary::summarize_night;
use clap::Args;

#[derive(Args)]
pub struct SummarizeArgs {
    /// Reduced directory of one night (`<target>/<filter>/` below it)
    pub reduced_dir: PathBuf,
}

pub fn run(args: &SummarizeArgs) -> Result<()> {
    let products = summarize_night(&args.reduced_dir)?;
    match products.contrast_curves {
        Some(ref path) => println!("Contrast curves: {} -> {}", products.curves, path.display()),
        None => println!("Contrast curves: none found"),
    }
    match products.image_grid {
        Some(ref path) => println!("Image grid:      {} -> {}", products.images, path.display()),
        None => println!("Image grid:      no final images"),
    }
    Ok(())
}
