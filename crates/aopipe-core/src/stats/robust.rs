use ndarray::Array2;
use num_traits::Float;
use rayon::prelude::*;
use tracing::debug;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Clipped background estimate over a pixel subset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RobustStats {
    pub mean: f64,
    pub std: f64,
    /// Number of pixels left after clipping.
    pub retained: usize,
}

impl RobustStats {
    pub fn nan() -> Self {
        Self {
            mean: f64::NAN,
            std: f64::NAN,
            retained: 0,
        }
    }
}

/// Result of a fixed-iteration sigma clip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClippedStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
}

/// Iterative median-centred sigma clipping.
///
/// Each pass computes the median and population standard deviation of the
/// retained set and keeps values with `|x - median| <= clip_sigma * std`.
/// Stops once the retained count changes by at most `converge_frac` of the
/// previous count, or when nothing is left. Non-finite inputs are ignored.
///
/// An emptied (or empty) set yields `RobustStats::nan()`.
pub fn robust_stats(pixels: &[f64], clip_sigma: f64, converge_frac: f64) -> RobustStats {
    let mut kept: Vec<f64> = pixels.iter().copied().filter(|v| v.is_finite()).collect();
    if kept.is_empty() {
        debug!("robust_stats called on an empty pixel set");
        return RobustStats::nan();
    }

    let mut scratch = Vec::with_capacity(kept.len());
    loop {
        let last = kept.len();
        scratch.clear();
        scratch.extend_from_slice(&kept);
        let median = median_in_place(&mut scratch);
        let sigma = population_std(&kept);
        let bound = clip_sigma * sigma;

        kept.retain(|v| (v - median).abs() <= bound);
        let count = kept.len();

        if count == 0 {
            debug!(last, "sigma clipping emptied the pixel set");
            return RobustStats::nan();
        }
        if (last - count) as f64 / last as f64 <= converge_frac {
            break;
        }
    }

    RobustStats {
        mean: mean(&kept),
        std: population_std(&kept),
        retained: kept.len(),
    }
}

/// Sigma-clipped mean/median/std with a fixed iteration cap.
///
/// Clips around the median at `sigma` standard deviations until no value
/// is rejected or `max_iters` passes have run.
pub fn sigma_clipped_stats(values: &[f64], sigma: f64, max_iters: usize) -> ClippedStats {
    let mut kept: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let mut scratch = Vec::with_capacity(kept.len());

    for _ in 0..max_iters {
        if kept.is_empty() {
            break;
        }
        scratch.clear();
        scratch.extend_from_slice(&kept);
        let median = median_in_place(&mut scratch);
        let bound = sigma * population_std(&kept);
        let before = kept.len();
        kept.retain(|v| (v - median).abs() <= bound);
        if kept.len() == before {
            break;
        }
    }

    if kept.is_empty() {
        return ClippedStats {
            mean: f64::NAN,
            median: f64::NAN,
            std: f64::NAN,
        };
    }

    let std = population_std(&kept);
    let mean = mean(&kept);
    ClippedStats {
        mean,
        median: median_in_place(&mut kept),
        std,
    }
}

/// Median of a slice, reordering it. Returns NaN for an empty slice.
///
/// Uses `select_nth_unstable` for O(n) selection.
pub fn median_in_place<T: Float>(values: &mut [T]) -> T {
    let n = values.len();
    if n == 0 {
        return T::nan();
    }
    let cmp = |a: &T, b: &T| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal);
    let mid = n / 2;
    if n % 2 == 1 {
        *values.select_nth_unstable_by(mid, cmp).1
    } else {
        values.select_nth_unstable_by(mid, cmp);
        let upper = values[mid];
        let lower = *values[..mid].select_nth_unstable_by(mid - 1, cmp).1;
        (lower + upper) / (T::one() + T::one())
    }
}

/// Median ignoring NaNs. NaN if no finite value is present.
pub fn nan_median<T: Float>(values: &[T]) -> T {
    let mut finite: Vec<T> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    median_in_place(&mut finite)
}

/// Population standard deviation ignoring NaNs.
pub fn nan_std(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    population_std(&finite)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with `ddof = 0`.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Sliding median filter over a `size`×`size` footprint.
///
/// The footprint is clipped at the image border and NaN neighbours are
/// skipped, so a pixel surrounded only by NaNs stays NaN. Even sizes extend
/// one pixel further up/left than down/right.
pub fn median_filter(image: &Array2<f64>, size: usize) -> Array2<f64> {
    let (h, w) = image.dim();
    let size = size.max(1);
    let before = size / 2;
    let after = size - 1 - before;

    let filter_row = |row: usize| -> Vec<f64> {
        let r0 = row.saturating_sub(before);
        let r1 = (row + after).min(h - 1);
        let mut window = Vec::with_capacity(size * size);
        (0..w)
            .map(|col| {
                let c0 = col.saturating_sub(before);
                let c1 = (col + after).min(w - 1);
                window.clear();
                for r in r0..=r1 {
                    for c in c0..=c1 {
                        let v = image[[r, c]];
                        if !v.is_nan() {
                            window.push(v);
                        }
                    }
                }
                median_in_place(&mut window)
            })
            .collect()
    };

    let rows: Vec<Vec<f64>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(filter_row).collect()
    } else {
        (0..h).map(filter_row).collect()
    };

    let mut result = Array2::<f64>::zeros((h, w));
    for (row, values) in rows.into_iter().enumerate() {
        for (col, v) in values.into_iter().enumerate() {
            result[[row, col]] = v;
        }
    }
    result
}
