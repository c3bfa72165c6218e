use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::consts::ROUGH_WINDOW_DIVISOR;
use crate::frame::{geometric_center, Center, Shift};
use crate::pipeline::config::RegistrationConfig;

use super::registration::{Registration, RegistrationStrategy};
use super::roll::{roll_shift, Window};
use super::subpixel::{subpixel_shift, upsample_bicubic};

/// Pixel of `data` seen at `(row, col)` after `k` quarter turns about
/// `(h / 2, w / 2)`. Positions rotated in from outside read as 0.
fn quarter_turn_sample(data: &Array2<f64>, row: usize, col: usize, k: u8) -> f64 {
    let (h, w) = data.dim();
    let (cr, cc) = ((h / 2) as isize, (w / 2) as isize);
    let (y, x) = (row as isize - cr, col as isize - cc);
    let (sr, sc) = match k {
        1 => (cr + x, cc - y),
        2 => (cr - y, cc - x),
        _ => (cr - x, cc + y),
    };
    if sr < 0 || sc < 0 || sr >= h as isize || sc >= w as isize {
        0.0
    } else {
        data[[sr as usize, sc as usize]]
    }
}

/// Total absolute difference between `data` and its 90°, 180° and 270°
/// rotations.
pub fn rotate_sub(data: &Array2<f64>) -> f64 {
    let mut total = 0.0;
    for k in 1..=3u8 {
        for ((row, col), &v) in data.indexed_iter() {
            total += (v - quarter_turn_sample(data, row, col, k)).abs();
        }
    }
    total
}

/// Rotational residual for every integer shift in `[-radius, radius]²`.
///
/// Entry `[dy + radius, dx + radius]` is `rotate_sub` of the window rolled
/// by `(dy, dx)` with zero fill.
pub fn rotational_residuals(window: &Array2<f64>, radius: usize) -> Array2<f64> {
    let side = 2 * radius + 1;
    let r = radius as isize;
    let values: Vec<f64> = (0..side * side)
        .into_par_iter()
        .map(|idx| {
            let dy = (idx / side) as isize - r;
            let dx = (idx % side) as isize - r;
            rotate_sub(&roll_shift(window, dy, dx, 0.0))
        })
        .collect();
    Array2::from_shape_fn((side, side), |(i, j)| values[i * side + j])
}

/// Sub-pixel minimum of a residual surface indexed `[dy + r, dx + r]`.
///
/// The squared surface is bicubically resampled on a `1 / factor` lattice
/// over `[-r, r]` and the first minimum in raster order wins.
pub fn upsampled_argmin(residuals: &Array2<f64>, radius: usize, factor: usize) -> Shift {
    let factor = factor.max(1);
    // An L1 residual is a cone about its minimum; its square is locally
    // quadratic, which cubic resampling reproduces.
    let fine = upsample_bicubic(&residuals.mapv(|v| v * v), factor);
    let mut best = (0usize, 0usize);
    let mut best_val = f64::INFINITY;
    for ((i, j), &v) in fine.indexed_iter() {
        if v < best_val {
            best_val = v;
            best = (i, j);
        }
    }
    let to_shift = |k: usize| k as f64 / factor as f64 - radius as f64;
    Shift::new(to_shift(best.0), to_shift(best.1))
}

/// Residual surface divided by its maximum; all-NaN when the maximum is 0.
pub fn normalize_residuals(residuals: &Array2<f64>) -> Array2<f64> {
    let max = residuals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == 0.0 || !max.is_finite() {
        Array2::from_elem(residuals.dim(), f64::NAN)
    } else {
        residuals.mapv(|v| v / max)
    }
}

/// Centre a saturated star by minimising its rotational residual.
///
/// Negative and NaN pixels are zeroed in the working copy. With a rough
/// centre the copy is first rolled so that position sits at the frame
/// centre, and the working window shrinks to the rough-centre window. The
/// combined shift is applied to the untouched input by interpolation.
/// Always produces a result.
pub fn register_saturated(
    image: &Array2<f64>,
    rough_center: Option<Center>,
    config: &RegistrationConfig,
) -> Registration {
    let (h, w) = image.dim();
    let work = image.mapv(|v| if v.is_finite() && v > 0.0 { v } else { 0.0 });

    let mut window_side = config.saturated_window;
    let (pre, work) = match rough_center {
        Some(rough) => {
            let target = geometric_center(image);
            let pre = Shift::new(
                target.row - rough.row.round(),
                target.col - rough.col.round(),
            );
            let rough_side = 2 * (h / ROUGH_WINDOW_DIVISOR);
            window_side = window_side.min(rough_side.max(2 * config.search_radius + 1));
            let rolled = roll_shift(&work, pre.drow as isize, pre.dcol as isize, 0.0);
            (pre, rolled)
        }
        None => (Shift::default(), work),
    };

    let window = Window::centered(window_side, window_side, (h, w)).extract(&work);
    let residuals = rotational_residuals(&window, config.search_radius);
    let refined = upsampled_argmin(&residuals, config.search_radius, config.upsample);
    let shift = pre + refined;

    let residual_map = normalize_residuals(&residuals);
    if residual_map.iter().all(|v| v.is_nan()) {
        warn!("rotational residuals are all zero; residual map is undefined");
    }
    debug!(
        drow = shift.drow,
        dcol = shift.dcol,
        window = window_side,
        "saturated registration"
    );

    Registration {
        image: subpixel_shift(image, shift, config.interpolation),
        shift,
        strategy: RegistrationStrategy::Saturated,
        residual_map: Some(residual_map),
    }
}
