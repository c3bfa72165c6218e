mod fwhm;
pub mod sources;

use std::path::Path;

use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::contrast::{compute_contrast_curve, ContrastCurve};
use crate::error::{AoError, Result};
use crate::frame::Center;
use crate::pipeline::{AnalysisConfig, ContrastConfig};

pub use fwhm::{estimate_fwhm, estimate_fwhm_default};
pub use sources::{find_center, find_sources, DetectedSource};

/// Converged star position and width of a reduced image.
#[derive(Clone, Debug)]
pub struct ImageAnalysis {
    pub center: Center,
    pub fwhm: f64,
    /// Passes made, counting the initial search.
    pub iterations: usize,
    /// Whether both tolerances were met before the iteration cap.
    pub converged: bool,
    /// Sources from the last search.
    pub sources: Vec<DetectedSource>,
}

#[derive(Serialize)]
struct KeyDetails<'a> {
    filename: &'a str,
    xcen: f64,
    ycen: f64,
    fwhm: f64,
}

/// Locate the primary star and its FWHM by alternating source detection
/// and FWHM estimation.
///
/// The first search uses `initial_fwhm`; every later search uses the
/// previous FWHM estimate. The loop stops once the centre moves by at
/// most `position_tolerance` and the FWHM by at most `fwhm_tolerance`,
/// or after `max_iterations` passes.
pub fn analyze_image(image: &Array2<f64>, config: &AnalysisConfig) -> Result<ImageAnalysis> {
    let no_sources = || AoError::NoSourcesDetected {
        max_fwhm: config.max_search_fwhm,
    };

    let mut sources = find_sources(image, config.initial_fwhm, config);
    let mut center = find_center(&sources).ok_or_else(no_sources)?;
    let mut fwhm = estimate_fwhm_default(image, center);
    debug!(row = center.row, col = center.col, fwhm, "initial estimate");

    let mut iterations = 1;
    let mut position_change = f64::INFINITY;
    let mut fwhm_change = f64::INFINITY;
    while iterations < config.max_iterations
        && (position_change > config.position_tolerance || fwhm_change > config.fwhm_tolerance)
    {
        sources = find_sources(image, fwhm, config);
        let updated_center = find_center(&sources).ok_or_else(no_sources)?;
        let updated_fwhm = estimate_fwhm_default(image, updated_center);

        position_change = updated_center.distance(&center);
        fwhm_change = (updated_fwhm - fwhm).abs();
        debug!(
            iteration = iterations,
            position_change, fwhm_change, "refined centre and FWHM"
        );

        center = updated_center;
        fwhm = updated_fwhm;
        iterations += 1;
    }

    let converged =
        position_change <= config.position_tolerance && fwhm_change <= config.fwhm_tolerance;
    if !converged {
        warn!(
            iterations,
            position_change, fwhm_change, "analysis stopped before converging"
        );
    }

    Ok(ImageAnalysis {
        center,
        fwhm,
        iterations,
        converged,
        sources,
    })
}

/// Analyse `image` and write `key_details.csv`, `detected_stars.csv` and
/// `contrast_curve.csv` (measured at the converged centre) to `output_dir`.
pub fn analyze_reduced_image(
    image: &Array2<f64>,
    filename: &str,
    plate_scale: f64,
    config: &AnalysisConfig,
    contrast: &ContrastConfig,
    output_dir: &Path,
) -> Result<(ImageAnalysis, ContrastCurve)> {
    let analysis = analyze_image(image, config)?;
    std::fs::create_dir_all(output_dir)?;
    write_key_details(&output_dir.join("key_details.csv"), filename, &analysis)?;
    write_sources(&output_dir.join("detected_stars.csv"), &analysis.sources)?;

    let curve = compute_contrast_curve(image, analysis.fwhm, plate_scale, Some(analysis.center), contrast)?;
    curve.write_csv(&output_dir.join("contrast_curve.csv"))?;

    info!(
        file = filename,
        row = analysis.center.row,
        col = analysis.center.col,
        fwhm = analysis.fwhm,
        sources = analysis.sources.len(),
        "image analysed"
    );
    Ok((analysis, curve))
}

fn write_key_details(path: &Path, filename: &str, analysis: &ImageAnalysis) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.serialize(KeyDetails {
        filename,
        xcen: analysis.center.col,
        ycen: analysis.center.row,
        fwhm: analysis.fwhm,
    })?;
    writer.flush()?;
    Ok(())
}

fn write_sources(path: &Path, sources: &[DetectedSource]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for source in sources {
        writer.serialize(source)?;
    }
    writer.flush()?;
    Ok(())
}
