#![allow(dead_code)]

use std::path::Path;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use aopipe_core::frame::{FrameHeader, HeaderValue};
use aopipe_core::io::write_fits;

/// Circular Gaussian star of the given peak and sigma on a zero background.
pub fn gaussian_star(rows: usize, cols: usize, row: f64, col: f64, peak: f64, sigma: f64) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let d2 = (r as f64 - row).powi(2) + (c as f64 - col).powi(2);
        peak * (-d2 / (2.0 * sigma * sigma)).exp()
    })
}

/// Flat-topped disk (a saturated core) of `radius` pixels.
pub fn flat_top_disk(rows: usize, cols: usize, row: f64, col: f64, radius: f64, level: f64) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let d2 = (r as f64 - row).powi(2) + (c as f64 - col).powi(2);
        if d2 <= radius * radius {
            level
        } else {
            0.0
        }
    })
}

/// Seeded Gaussian noise image.
pub fn noise(rows: usize, cols: usize, mean: f64, std: f64, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(mean, std).unwrap();
    Array2::from_shape_fn((rows, cols), |_| normal.sample(&mut rng))
}

pub fn header(cards: &[(&str, HeaderValue)]) -> FrameHeader {
    let mut header = FrameHeader::new();
    for (key, value) in cards {
        header.set(key, value.clone());
    }
    header
}

/// Write a raw frame `<dir>/<prefix><NNNN>.fits`.
pub fn write_raw(dir: &Path, prefix: &str, number: u32, data: &Array2<f64>, header: &FrameHeader) {
    let path = dir.join(format!("{prefix}{number:04}.fits"));
    write_fits(&path, data, header).unwrap();
}

/// Location of the maximum finite pixel.
pub fn peak_position(image: &Array2<f64>) -> (usize, usize) {
    let mut best = ((0, 0), f64::NEG_INFINITY);
    for ((r, c), &v) in image.indexed_iter() {
        if v.is_finite() && v > best.1 {
            best = ((r, c), v);
        }
    }
    best.0
}

/// One 80-column FITS header card.
pub fn card(text: &str) -> Vec<u8> {
    format!("{text:<80}").into_bytes()
}
