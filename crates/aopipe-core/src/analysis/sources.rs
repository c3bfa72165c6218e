use ndarray::{Array2, Axis, Zip};
use serde::Serialize;
use tracing::debug;

use crate::align::peaks::PeakCandidates;
use crate::consts::{FWHM_PER_SIGMA, SIGMA_CLIP_MAX_ITERS};
use crate::frame::Center;
use crate::pipeline::AnalysisConfig;
use crate::stats::sigma_clipped_stats;

/// A star found by [`find_sources`].
///
/// Serialised with `xcentroid`/`ycentroid` column names, x being the
/// column axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DetectedSource {
    pub id: usize,
    #[serde(rename = "xcentroid")]
    pub col: f64,
    #[serde(rename = "ycentroid")]
    pub row: f64,
    /// Brightest background-subtracted pixel near the source.
    pub peak: f64,
    /// Sum of the positive background-subtracted pixels in the centroid box.
    pub flux: f64,
    /// Kernel FWHM of the search that found the source.
    pub fwhm: f64,
}

/// Detect stars above `threshold_scale` clipped sigmas of the background.
///
/// The background median and sigma come from a `detect_sigma` clip of the
/// whole frame. The median-subtracted frame is matched-filtered with a
/// Gaussian of the given FWHM; local maxima of the filtered frame away
/// from the border are sources. When nothing is found the kernel widens
/// by one pixel until `max_search_fwhm` is reached. Sources come back
/// brightest first; an empty list means the search was exhausted.
pub fn find_sources(image: &Array2<f64>, fwhm: f64, config: &AnalysisConfig) -> Vec<DetectedSource> {
    let finite: Vec<f64> = image.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return Vec::new();
    }
    let background = sigma_clipped_stats(&finite, config.detect_sigma, SIGMA_CLIP_MAX_ITERS);
    let residual = image.mapv(|v| if v.is_finite() { v - background.median } else { 0.0 });
    let threshold = config.threshold_scale * background.std;

    let mut kernel_fwhm = fwhm;
    while kernel_fwhm < config.max_search_fwhm {
        let sources = detect(&residual, kernel_fwhm, threshold);
        if !sources.is_empty() {
            debug!(
                count = sources.len(),
                fwhm = kernel_fwhm,
                threshold,
                "sources detected"
            );
            return sources;
        }
        kernel_fwhm += 1.0;
    }
    debug!(threshold, max_fwhm = config.max_search_fwhm, "no sources detected");
    Vec::new()
}

/// Rounded centroid of the source with the highest peak.
pub fn find_center(sources: &[DetectedSource]) -> Option<Center> {
    let brightest = sources
        .iter()
        .fold(None::<&DetectedSource>, |best, s| match best {
            Some(b) if b.peak >= s.peak => Some(b),
            _ => Some(s),
        })?;
    Some(Center::new(brightest.row.round(), brightest.col.round()))
}

fn detect(residual: &Array2<f64>, fwhm: f64, threshold: f64) -> Vec<DetectedSource> {
    if !(fwhm.is_finite() && fwhm > 0.0) {
        return Vec::new();
    }
    let sigma = fwhm / FWHM_PER_SIGMA;
    let radius = ((1.5 * sigma).ceil() as usize).max(1);
    let filtered = matched_filter(residual, sigma, radius);

    PeakCandidates::new(&filtered, radius, true)
        .above(threshold)
        .into_iter()
        .enumerate()
        .map(|(i, peak)| {
            let (row, col, peak_value, flux) = centroid(residual, peak.row, peak.col, radius);
            DetectedSource {
                id: i + 1,
                col,
                row,
                peak: peak_value,
                flux,
                fwhm,
            }
        })
        .collect()
}

/// Least-squares amplitude of a Gaussian of width `sigma` centred on each
/// pixel. The kernel is separable, so rows and columns are filtered in turn.
fn matched_filter(data: &Array2<f64>, sigma: f64, radius: usize) -> Array2<f64> {
    let r = radius as isize;
    let taps: Vec<f64> = (-r..=r)
        .map(|k| (-((k * k) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let norm = taps.iter().map(|t| t * t).sum::<f64>().powi(2);
    let rows = convolve_lanes(data, &taps, Axis(1));
    convolve_lanes(&rows, &taps, Axis(0)).mapv(|v| v / norm)
}

/// Zero-padded 1-D convolution of every lane along `axis`.
fn convolve_lanes(data: &Array2<f64>, taps: &[f64], axis: Axis) -> Array2<f64> {
    let radius = (taps.len() / 2) as isize;
    let mut out = Array2::zeros(data.dim());
    Zip::from(out.lanes_mut(axis))
        .and(data.lanes(axis))
        .par_for_each(|mut dst, src| {
            let n = src.len() as isize;
            for i in 0..n {
                let mut acc = 0.0;
                for (k, &t) in taps.iter().enumerate() {
                    let j = i + k as isize - radius;
                    if (0..n).contains(&j) {
                        acc += t * src[j as usize];
                    }
                }
                dst[i as usize] = acc;
            }
        });
    out
}

/// Intensity-weighted centroid, peak and flux of the positive pixels in
/// the box of half-width `radius` around `(row, col)`.
fn centroid(residual: &Array2<f64>, row: usize, col: usize, radius: usize) -> (f64, f64, f64, f64) {
    let (h, w) = residual.dim();
    let r0 = row.saturating_sub(radius);
    let r1 = (row + radius).min(h - 1);
    let c0 = col.saturating_sub(radius);
    let c1 = (col + radius).min(w - 1);

    let (mut sum, mut sum_r, mut sum_c) = (0.0, 0.0, 0.0);
    let mut peak = f64::NEG_INFINITY;
    for r in r0..=r1 {
        for c in c0..=c1 {
            let v = residual[[r, c]];
            peak = peak.max(v);
            if v > 0.0 {
                sum += v;
                sum_r += v * r as f64;
                sum_c += v * c as f64;
            }
        }
    }
    if sum > 0.0 {
        (sum_r / sum, sum_c / sum, peak, sum)
    } else {
        (row as f64, col as f64, peak, 0.0)
    }
}
