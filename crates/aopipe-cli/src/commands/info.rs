use std::path::PathBuf;

use anyhow::Result;
use aopipe_core::frame::HeaderValue;
use aopipe_core::io::read_fits;
use aopipe_core::stats::nan_median;
use clap::Args;

#[derive(Args)]
pub struct InfoArgs {
    /// Input FITS file
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let frames = read_fits(&args.file)?;
    let Some(first) = frames.first() else {
        println!("File:        {}", args.file.display());
        println!("Planes:      0");
        return Ok(());
    };

    let values: Vec<f64> = first.data.iter().copied().collect();
    let finite = values.iter().filter(|v| v.is_finite()).count();

    println!("File:        {}", args.file.display());
    println!("Planes:      {}", frames.len());
    println!("Dimensions:  {}x{}", first.cols(), first.rows());
    println!("Median:      {:.3}", nan_median(&values));
    println!("Finite:      {} of {}", finite, values.len());

    if !first.header.is_empty() {
        println!();
        for (key, value) in first.header.iter() {
            let text = match value {
                HeaderValue::Str(s) => format!("'{s}'"),
                HeaderValue::Int(i) => i.to_string(),
                HeaderValue::Float(f) => f.to_string(),
                HeaderValue::Bool(b) => if *b { "T" } else { "F" }.to_string(),
            };
            println!("  {:<8} = {}", key, text);
        }
    }

    Ok(())
}
