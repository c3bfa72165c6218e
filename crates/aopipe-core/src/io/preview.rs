use std::path::Path;

use image::{GrayImage, ImageFormat, Luma};
use ndarray::Array2;

use crate::error::Result;

/// Save an image as an 8-bit grayscale PNG, scaled linearly between
/// `vmin` and `vmax`.
///
/// Missing limits default to the finite minimum/maximum of the image.
/// NaN pixels render black.
pub fn save_preview(data: &Array2<f64>, path: &Path, vmin: Option<f64>, vmax: Option<f64>) -> Result<()> {
    let (lo, hi) = display_limits(data, vmin, vmax);
    let span = if hi > lo { hi - lo } else { 1.0 };

    let (h, w) = data.dim();
    let mut img = GrayImage::new(w as u32, h as u32);
    for row in 0..h {
        for col in 0..w {
            let v = data[[row, col]];
            let val = if v.is_finite() {
                (((v - lo) / span).clamp(0.0, 1.0) * 255.0) as u8
            } else {
                0
            };
            img.put_pixel(col as u32, row as u32, Luma([val]));
        }
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Tile equally sized maps into one row-major mosaic, `columns` wide.
/// Gaps between tiles and unused cells are NaN.
pub fn mosaic(maps: &[Array2<f64>], columns: usize) -> Array2<f64> {
    let Some(first) = maps.first() else {
        return Array2::from_elem((0, 0), f64::NAN);
    };
    let (th, tw) = first.dim();
    let columns = columns.clamp(1, maps.len());
    let rows = maps.len().div_ceil(columns);
    let mut out = Array2::from_elem((rows * (th + 1), columns * (tw + 1)), f64::NAN);
    for (i, map) in maps.iter().enumerate() {
        let r0 = (i / columns) * (th + 1);
        let c0 = (i % columns) * (tw + 1);
        for ((r, c), &v) in map.indexed_iter() {
            if r < th && c < tw {
                out[[r0 + r, c0 + c]] = v;
            }
        }
    }
    out
}

fn display_limits(data: &Array2<f64>, vmin: Option<f64>, vmax: Option<f64>) -> (f64, f64) {
    let finite = || data.iter().copied().filter(|v| v.is_finite());
    let lo = vmin.unwrap_or_else(|| finite().fold(f64::INFINITY, f64::min));
    let hi = vmax.unwrap_or_else(|| finite().fold(f64::NEG_INFINITY, f64::max));
    if lo.is_finite() && hi.is_finite() {
        (lo, hi)
    } else {
        (0.0, 1.0)
    }
}
