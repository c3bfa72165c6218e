use std::path::Path;
use std::sync::Arc;

use ndarray::Array2;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::align::RegistrationStrategy;
use crate::analysis::estimate_fwhm;
use crate::calib::{
    calibrate_science, flat_path, load_product, make_master_dark, make_master_flat, make_master_sky,
    read_working_frames, sky_path,
};
use crate::consts::{MIN_FWHM, PARALLEL_FRAME_THRESHOLD};
use crate::contrast::compute_contrast_curve;
use crate::error::{AoError, Result};
use crate::frame::{geometric_center, Frame, Shift};
use crate::instrument::Instrument;
use crate::io::preview::{mosaic, save_preview};
use crate::io::{FrameStore, LogEntry, ObsLog};
use crate::stack::{stack_frames, StackResult};

use super::config::ReductionConfig;
use super::types::{NightSummary, NoOpReporter, PipelineStage, ProgressReporter, TargetReduction};

/// One row of `shifts.csv`.
#[derive(Debug, Serialize)]
struct ShiftRecord {
    frame: usize,
    file: Option<u32>,
    precenter_drow: f64,
    precenter_dcol: f64,
    drow: f64,
    dcol: f64,
    strategy: RegistrationStrategy,
}

/// Reduce a whole night: darks, flats, skies, then every science target.
///
/// Wide-binary targets need a rough centre in `config.rough_centers`; a
/// missing one aborts before any product is written.
pub fn reduce_night_reported(
    config: &ReductionConfig,
    store: &dyn FrameStore,
    instrument: &dyn Instrument,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<NightSummary> {
    reporter.begin_stage(PipelineStage::ReadingLog, None);
    let log = ObsLog::read(&config.obs_log)?;
    reporter.finish_stage();
    info!(
        rows = log.entries.len(),
        instrument = instrument.name(),
        "observation log read"
    );

    for entry in log.science() {
        if entry.method.needs_rough_center() && !config.rough_centers.contains_key(&entry.object) {
            return Err(AoError::MissingRoughCenter(entry.object.clone()));
        }
    }

    let reduced = config.reduced_dir.as_path();
    let mut summary = NightSummary::default();

    let darks: Vec<&LogEntry> = log.darks().collect();
    reporter.begin_stage(PipelineStage::Darks, Some(darks.len()));
    for (i, entry) in darks.iter().enumerate() {
        let (_, path) = make_master_dark(store, instrument, &entry.filenums, reduced)?;
        summary.darks.push(path);
        reporter.advance(i + 1);
    }
    reporter.finish_stage();

    let flats: Vec<&LogEntry> = log.flats().collect();
    reporter.begin_stage(PipelineStage::Flats, Some(flats.len()));
    for (i, entry) in flats.iter().enumerate() {
        let (_, path) = make_master_flat(
            store,
            instrument,
            &entry.filenums,
            entry.exp_time,
            &entry.filter,
            reduced,
        )?;
        summary.flats.push(path);
        reporter.advance(i + 1);
    }
    reporter.finish_stage();

    let skies: Vec<&LogEntry> = log.skies().collect();
    reporter.begin_stage(PipelineStage::Skies, Some(skies.len()));
    for (i, entry) in skies.iter().enumerate() {
        let (_, path) = make_master_sky(
            store,
            instrument,
            &entry.filenums,
            &entry.object,
            &entry.filter,
            reduced,
        )?;
        summary.skies.push(path);
        reporter.advance(i + 1);
    }
    reporter.finish_stage();

    for entry in log.science() {
        let target = reduce_target(config, store, instrument, entry, reporter.as_ref())?;
        summary.targets.push(target);
    }

    info!(
        darks = summary.darks.len(),
        flats = summary.flats.len(),
        skies = summary.skies.len(),
        targets = summary.targets.len(),
        "night reduced"
    );
    Ok(summary)
}

/// [`reduce_night_reported`] without progress reporting.
pub fn reduce_night(
    config: &ReductionConfig,
    store: &dyn FrameStore,
    instrument: &dyn Instrument,
) -> Result<NightSummary> {
    reduce_night_reported(config, store, instrument, Arc::new(NoOpReporter))
}

/// Calibrate, register and stack one target/filter, then write its
/// products under `<reduced>/<target>/<filter>/`.
pub fn reduce_target(
    config: &ReductionConfig,
    store: &dyn FrameStore,
    instrument: &dyn Instrument,
    entry: &LogEntry,
    reporter: &dyn ProgressReporter,
) -> Result<TargetReduction> {
    let reduced = config.reduced_dir.as_path();
    let (raw_frames, header) = read_working_frames(store, instrument, &entry.filenums)?;
    let filter = instrument.filter_name(&header, &entry.filter);
    let flat = load_product(store, &flat_path(reduced, &instrument.flat_filter(&filter)), "flat")?;
    let sky = load_product(store, &sky_path(reduced, &entry.object, &filter), "sky")?;

    reporter.begin_stage(PipelineStage::Calibration, Some(raw_frames.len()));
    let calibrate = |raw: &Array2<f64>| calibrate_science(raw, &flat.data, &sky.data, instrument);
    let calibrated: Vec<(Array2<f64>, Shift)> = if raw_frames.len() >= PARALLEL_FRAME_THRESHOLD {
        raw_frames.par_iter().map(calibrate).collect::<Result<_>>()?
    } else {
        raw_frames.iter().map(calibrate).collect::<Result<_>>()?
    };
    drop(raw_frames);
    reporter.finish_stage();
    let (frames, precenter): (Vec<Array2<f64>>, Vec<Shift>) = calibrated.into_iter().unzip();

    let rough_center = if entry.method.needs_rough_center() {
        let center = config
            .rough_centers
            .get(&entry.object)
            .copied()
            .ok_or_else(|| AoError::MissingRoughCenter(entry.object.clone()))?;
        Some(center)
    } else {
        None
    };

    let strategy = entry.method.strategy();
    reporter.begin_stage(PipelineStage::Registration, Some(frames.len()));
    let stacked = stack_frames(
        &frames,
        strategy,
        rough_center,
        &config.registration,
        &config.stacking,
        |done| reporter.advance(done),
    )?;
    reporter.finish_stage();
    let fallbacks = stacked.fallbacks(strategy);
    if fallbacks > 0 {
        warn!(object = %entry.object, filter = %filter, fallbacks, "frames fell back to saturated registration");
    }

    let output_dir = reduced.join(&entry.object).join(&filter);
    reporter.begin_stage(PipelineStage::Writing, None);
    let final_frame = Frame::with_header(stacked.image.clone(), header);
    store.write_image(&final_frame, &output_dir.join("final_im.fits"))?;
    write_shift_table(&output_dir.join("shifts.csv"), &entry.filenums, &precenter, &stacked)?;
    write_diagnostics(config, store, &final_frame, &stacked, &output_dir)?;
    reporter.finish_stage();

    let fwhm = estimate_fwhm(&stacked.image, geometric_center(&stacked.image), MIN_FWHM);
    let contrast = if config.contrast.enabled {
        reporter.begin_stage(PipelineStage::Contrast, None);
        let curve = compute_contrast_curve(
            &stacked.image,
            fwhm,
            instrument.plate_scale(),
            None,
            &config.contrast,
        )?;
        curve.write_csv(&output_dir.join("contrast_curve.csv"))?;
        reporter.finish_stage();
        Some(curve)
    } else {
        None
    };

    info!(
        object = %entry.object,
        filter = %filter,
        method = %entry.method,
        frames = frames.len(),
        fwhm,
        "target reduced"
    );
    Ok(TargetReduction {
        target: entry.object.clone(),
        filter,
        method: entry.method,
        frames: frames.len(),
        fallbacks,
        fwhm,
        output_dir,
        contrast,
    })
}

fn write_shift_table(path: &Path, filenums: &[u32], precenter: &[Shift], stacked: &StackResult) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for (frame_shift, pre) in stacked.shifts.iter().zip(precenter) {
        writer.serialize(ShiftRecord {
            frame: frame_shift.index,
            file: filenums.get(frame_shift.index).copied(),
            precenter_drow: pre.drow,
            precenter_dcol: pre.dcol,
            drow: frame_shift.shift.drow,
            dcol: frame_shift.shift.dcol,
            strategy: frame_shift.strategy,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Residual-map cube and, when enabled, PNG previews.
fn write_diagnostics(
    config: &ReductionConfig,
    store: &dyn FrameStore,
    final_frame: &Frame,
    stacked: &StackResult,
    output_dir: &Path,
) -> Result<()> {
    let maps: Vec<Array2<f64>> = stacked.residual_maps.iter().map(|(_, m)| m.clone()).collect();
    if !maps.is_empty() {
        store.write_cube(&maps, &final_frame.header, &output_dir.join("rots.fits"))?;
    }

    if config.preview.enabled {
        save_preview(
            &final_frame.data,
            &output_dir.join("final_image.png"),
            config.preview.vmin,
            config.preview.vmax,
        )?;
        if !maps.is_empty() {
            let columns = (maps.len() as f64).sqrt().ceil() as usize;
            save_preview(&mosaic(&maps, columns), &output_dir.join("rots.png"), Some(0.0), Some(1.0))?;
        }
    }
    Ok(())
}
