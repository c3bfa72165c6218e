use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use aopipe_core::instrument::instrument_for;
use aopipe_core::io::FitsStore;
use aopipe_core::pipeline::{reduce_night_reported, PipelineStage, ProgressReporter, ReductionConfig};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::summary::{print_night_config, print_night_results};

#[derive(Args)]
pub struct RunArgs {
    /// Night configuration (TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override the output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("Failed to read config {}", args.config.display()))?;
    let mut config: ReductionConfig = toml::from_str(&text)
        .with_context(|| format!("Failed to parse config {}", args.config.display()))?;
    if let Some(ref output) = args.output {
        config.reduced_dir = output.clone();
    }

    info!(config = %args.config.display(), "night configuration loaded");

    let instrument = instrument_for(config.instrument, config.bad_pixel_mask.as_deref())?;
    let store = FitsStore::new(&config.raw_dir, instrument.file_prefix());

    print_night_config(&config);

    let reporter = Arc::new(IndicatifReporter::default());
    let summary = reduce_night_reported(&config, &store, instrument.as_ref(), reporter)?;

    print_night_results(&summary);
    Ok(())
}

/// Shows one bar per stage; stages without a known size get a spinner.
#[derive(Default)]
struct IndicatifReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressReporter for IndicatifReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        let pb = match total_items {
            Some(total) => {
                let pb = ProgressBar::new(total as u64);
                if let Ok(style) = ProgressStyle::default_bar().template("{msg:<28} [{bar:40}] {pos}/{len}") {
                    pb.set_style(style.progress_chars("=> "));
                }
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::default_spinner().template("{msg:<28} {spinner}") {
                    pb.set_style(style);
                }
                pb
            }
        };
        pb.set_message(stage.to_string());
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(old) = slot.replace(pb) {
                old.finish();
            }
        }
    }

    fn advance(&self, items_done: usize) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(pb) = slot.as_ref() {
                pb.set_position(items_done as u64);
            }
        }
    }

    fn finish_stage(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(pb) = slot.take() {
                pb.finish();
            }
        }
    }
}
