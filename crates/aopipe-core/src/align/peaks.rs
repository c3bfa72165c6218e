use std::collections::VecDeque;

use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::{MAX_ACCEPTED_PEAKS, PARALLEL_PIXEL_THRESHOLD};
use crate::frame::Center;

/// Outcome of a centroid search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PeakSearch {
    Found(Center),
    NotFound,
}

impl PeakSearch {
    pub fn center(&self) -> Option<Center> {
        match self {
            Self::Found(c) => Some(*c),
            Self::NotFound => None,
        }
    }
}

/// A local maximum of the image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

/// Local maxima over a `(2 * min_distance + 1)`² footprint, brightest first.
///
/// Threshold-independent, so a threshold search can reuse one candidate list.
#[derive(Clone, Debug)]
pub struct PeakCandidates {
    candidates: Vec<Peak>,
    min_distance: usize,
}

impl PeakCandidates {
    /// Collect candidates. With `exclude_border`, maxima closer than
    /// `min_distance` to any edge are dropped. NaN never forms a peak.
    pub fn new(image: &Array2<f64>, min_distance: usize, exclude_border: bool) -> Self {
        let (h, w) = image.dim();
        let clean = image.mapv(|v| if v.is_nan() { f64::NEG_INFINITY } else { v });
        let local_max = max_filter(&clean, min_distance);

        let border = if exclude_border { min_distance } else { 0 };
        let mut candidates = Vec::new();
        for row in border..h.saturating_sub(border) {
            for col in border..w.saturating_sub(border) {
                let v = clean[[row, col]];
                if v.is_finite() && v == local_max[[row, col]] {
                    candidates.push(Peak { row, col, value: v });
                }
            }
        }
        // Stable: equal values keep raster order.
        candidates.sort_by(|a, b| b.value.total_cmp(&a.value));

        Self {
            candidates,
            min_distance,
        }
    }

    /// Peaks strictly above `threshold`, thinned so that no two are within
    /// `min_distance` (Chebyshev) of each other. Brighter peaks win.
    pub fn above(&self, threshold: f64) -> Vec<Peak> {
        let mut kept: Vec<Peak> = Vec::new();
        for peak in self.candidates.iter().take_while(|p| p.value > threshold) {
            let close = kept.iter().any(|k| {
                let dr = k.row.abs_diff(peak.row);
                let dc = k.col.abs_diff(peak.col);
                dr.max(dc) <= self.min_distance
            });
            if !close {
                kept.push(*peak);
            }
        }
        kept
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Binary search over integer thresholds for a level that leaves between one
/// and three peaks, as used by the brute-force registration.
///
/// Starts from `[0, max]`. Too many peaks raise the lower bound, none lower
/// the upper bound. Returns the brightest accepted peak, or `NotFound` if
/// the bounds cross.
pub fn search_threshold(image: &Array2<f64>, min_distance: usize, exclude_border: bool) -> PeakSearch {
    let candidates = PeakCandidates::new(image, min_distance, exclude_border);
    if candidates.is_empty() {
        return PeakSearch::NotFound;
    }

    let max_val = image
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    let mut lower = 0.0f64;
    let mut upper = max_val;

    while lower <= upper {
        let threshold = ((lower + upper) / 2.0).floor();
        let peaks = candidates.above(threshold);
        if peaks.len() > MAX_ACCEPTED_PEAKS {
            lower = threshold + 1.0;
        } else if peaks.is_empty() {
            upper = threshold - 1.0;
        } else {
            let p = peaks[0];
            return PeakSearch::Found(Center::new(p.row as f64, p.col as f64));
        }
    }
    PeakSearch::NotFound
}

/// Location of the maximum finite value, or `None` for an all-NaN image.
pub fn argmax(image: &Array2<f64>) -> Option<(usize, usize)> {
    let mut best: Option<((usize, usize), f64)> = None;
    for ((r, c), &v) in image.indexed_iter() {
        if v.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| v > b) {
            best = Some(((r, c), v));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Separable sliding maximum with a `(2 * radius + 1)`-wide window,
/// clipped at the borders.
pub fn max_filter(image: &Array2<f64>, radius: usize) -> Array2<f64> {
    let (h, w) = image.dim();
    let parallel = h * w >= PARALLEL_PIXEL_THRESHOLD;

    let row_pass: Vec<Vec<f64>> = if parallel {
        (0..h)
            .into_par_iter()
            .map(|r| sliding_max(&image.row(r).to_vec(), radius))
            .collect()
    } else {
        (0..h)
            .map(|r| sliding_max(&image.row(r).to_vec(), radius))
            .collect()
    };

    let col_pass: Vec<Vec<f64>> = if parallel {
        (0..w)
            .into_par_iter()
            .map(|c| sliding_max(&row_pass.iter().map(|row| row[c]).collect::<Vec<_>>(), radius))
            .collect()
    } else {
        (0..w)
            .map(|c| sliding_max(&row_pass.iter().map(|row| row[c]).collect::<Vec<_>>(), radius))
            .collect()
    };

    Array2::from_shape_fn((h, w), |(r, c)| col_pass[c][r])
}

/// Monotonic-deque running maximum over `[i - radius, i + radius]`.
fn sliding_max(values: &[f64], radius: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NEG_INFINITY; n];
    let mut deque: VecDeque<usize> = VecDeque::new();
    let mut next = 0usize;

    for (i, slot) in out.iter_mut().enumerate() {
        let hi = (i + radius).min(n - 1);
        while next <= hi {
            while deque.back().is_some_and(|&b| values[b] <= values[next]) {
                deque.pop_back();
            }
            deque.push_back(next);
            next += 1;
        }
        let lo = i.saturating_sub(radius);
        while deque.front().is_some_and(|&f| f < lo) {
            deque.pop_front();
        }
        if let Some(&f) = deque.front() {
            *slot = values[f];
        }
    }
    out
}
