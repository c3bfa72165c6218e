use ndarray::Array2;
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::FftPlanner;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::frame::Shift;
use crate::pipeline::config::ShiftInterpolation;

/// Refine peak location using paraboloid fitting on the 3x3 neighborhood.
///
/// Returns (delta_row, delta_col) as fractional pixel offsets from the integer peak.
pub fn refine_peak_paraboloid(surface: &Array2<f64>, peak_row: usize, peak_col: usize) -> (f64, f64) {
    let (h, w) = surface.dim();

    // Need 3x3 neighborhood
    if peak_row == 0 || peak_row + 1 >= h || peak_col == 0 || peak_col + 1 >= w {
        return (0.0, 0.0);
    }

    let vertex = |prev: f64, curr: f64, next: f64| {
        let curvature = prev - 2.0 * curr + next;
        if curvature.abs() > 1e-12 {
            (prev - next) / (2.0 * curvature)
        } else {
            0.0
        }
    };

    let delta_row = vertex(
        surface[[peak_row - 1, peak_col]],
        surface[[peak_row, peak_col]],
        surface[[peak_row + 1, peak_col]],
    );
    let delta_col = vertex(
        surface[[peak_row, peak_col - 1]],
        surface[[peak_row, peak_col]],
        surface[[peak_row, peak_col + 1]],
    );

    (delta_row.clamp(-0.5, 0.5), delta_col.clamp(-0.5, 0.5))
}

/// Translate an image by a possibly fractional shift. Content moves by
/// `(drow, dcol)`; vacated pixels become 0.
pub fn subpixel_shift(image: &Array2<f64>, shift: Shift, interpolation: ShiftInterpolation) -> Array2<f64> {
    match interpolation {
        ShiftInterpolation::Bilinear => resample(image, shift, bilinear_sample),
        ShiftInterpolation::Bicubic => resample(image, shift, bicubic_sample),
        ShiftInterpolation::Fourier => fourier_shift(image, shift),
    }
}

fn resample(image: &Array2<f64>, shift: Shift, sampler: fn(&Array2<f64>, f64, f64) -> f64) -> Array2<f64> {
    let (h, w) = image.dim();
    let shift_row = |row: usize| -> Vec<f64> {
        let src_y = row as f64 - shift.drow;
        (0..w)
            .map(|col| sampler(image, src_y, col as f64 - shift.dcol))
            .collect()
    };

    let rows: Vec<Vec<f64>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(shift_row).collect()
    } else {
        (0..h).map(shift_row).collect()
    };

    let mut result = Array2::<f64>::zeros((h, w));
    for (row, values) in rows.into_iter().enumerate() {
        for (col, v) in values.into_iter().enumerate() {
            result[[row, col]] = v;
        }
    }
    result
}

/// Bilinear interpolation at fractional coordinates. Returns 0 outside bounds.
pub fn bilinear_sample(data: &Array2<f64>, y: f64, x: f64) -> f64 {
    let (h, w) = data.dim();

    if y < 0.0 || x < 0.0 || y > (h - 1) as f64 || x > (w - 1) as f64 {
        return 0.0;
    }

    let y0 = y.floor() as usize;
    let x0 = x.floor() as usize;
    let y1 = (y0 + 1).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);

    let fy = y - y0 as f64;
    let fx = x - x0 as f64;

    let mut acc = 0.0;
    for (r, wy) in [(y0, 1.0 - fy), (y1, fy)] {
        for (c, wx) in [(x0, 1.0 - fx), (x1, fx)] {
            let weight = wy * wx;
            if weight != 0.0 {
                acc += weight * data[[r, c]];
            }
        }
    }
    acc
}

/// Keys cubic convolution kernel with `a = -0.5`.
pub fn cubic_kernel(t: f64) -> f64 {
    const A: f64 = -0.5;
    let t = t.abs();
    if t <= 1.0 {
        (A + 2.0) * t * t * t - (A + 3.0) * t * t + 1.0
    } else if t < 2.0 {
        A * t * t * t - 5.0 * A * t * t + 8.0 * A * t - 4.0 * A
    } else {
        0.0
    }
}

/// Bicubic interpolation at fractional coordinates.
///
/// Taps outside the image count as 0. Zero-weight taps are skipped so a NaN
/// neighbour does not leak into an exact grid sample.
pub fn bicubic_sample(data: &Array2<f64>, y: f64, x: f64) -> f64 {
    let (h, w) = data.dim();
    if y <= -1.0 || x <= -1.0 || y >= h as f64 || x >= w as f64 {
        return 0.0;
    }

    let y0 = y.floor() as isize;
    let x0 = x.floor() as isize;
    let fy = y - y0 as f64;
    let fx = x - x0 as f64;

    let mut acc = 0.0;
    for dy in -1..=2isize {
        let r = y0 + dy;
        let wy = cubic_kernel(fy - dy as f64);
        if wy == 0.0 || r < 0 || r >= h as isize {
            continue;
        }
        for dx in -1..=2isize {
            let c = x0 + dx;
            let wx = cubic_kernel(fx - dx as f64);
            if wx == 0.0 || c < 0 || c >= w as isize {
                continue;
            }
            acc += wy * wx * data[[r as usize, c as usize]];
        }
    }
    acc
}

/// Bicubic sample with coordinates clamped to the grid (edge replication).
pub fn bicubic_sample_clamped(data: &Array2<f64>, y: f64, x: f64) -> f64 {
    let (h, w) = data.dim();
    let y0 = y.floor() as isize;
    let x0 = x.floor() as isize;
    let fy = y - y0 as f64;
    let fx = x - x0 as f64;

    let mut acc = 0.0;
    for dy in -1..=2isize {
        let wy = cubic_kernel(fy - dy as f64);
        if wy == 0.0 {
            continue;
        }
        let r = (y0 + dy).clamp(0, h as isize - 1) as usize;
        for dx in -1..=2isize {
            let wx = cubic_kernel(fx - dx as f64);
            if wx == 0.0 {
                continue;
            }
            let c = (x0 + dx).clamp(0, w as isize - 1) as usize;
            acc += wy * wx * data[[r, c]];
        }
    }
    acc
}

/// Fourier shift theorem translation. NaNs are treated as 0 and the
/// wrapped-in margin is zeroed afterwards.
pub fn fourier_shift(image: &Array2<f64>, shift: Shift) -> Array2<f64> {
    let (h, w) = image.dim();
    if h == 0 || w == 0 {
        return image.clone();
    }

    let clean = image.mapv(|v| if v.is_finite() { v } else { 0.0 });
    let mut spectrum = fft2d(&clean);

    let freq = |k: usize, n: usize| -> f64 {
        let k = if k > n / 2 { k as f64 - n as f64 } else { k as f64 };
        k / n as f64
    };
    for ((r, c), value) in spectrum.indexed_iter_mut() {
        let phase = -std::f64::consts::TAU * (freq(r, h) * shift.drow + freq(c, w) * shift.dcol);
        *value *= Complex::new(phase.cos(), phase.sin());
    }

    let mut result = ifft2d(&spectrum);

    // Zero the margin that the circular shift wrapped around.
    let row_cut = shift.drow.ceil() as isize;
    let col_cut = shift.dcol.ceil() as isize;
    let row_floor = shift.drow.floor() as isize;
    let col_floor = shift.dcol.floor() as isize;
    for ((r, c), v) in result.indexed_iter_mut() {
        let (r, c) = (r as isize, c as isize);
        let wrapped_row = (row_cut > 0 && r < row_cut) || (row_floor < 0 && r >= h as isize + row_floor);
        let wrapped_col = (col_cut > 0 && c < col_cut) || (col_floor < 0 && c >= w as isize + col_floor);
        if wrapped_row || wrapped_col {
            *v = 0.0;
        }
    }
    result
}

/// 2D FFT: row-wise FFT, then column-wise FFT.
fn fft2d(data: &Array2<f64>) -> Array2<Complex<f64>> {
    let mut result = data.mapv(|v| Complex::new(v, 0.0));
    transform_2d(&mut result, false);
    result
}

/// Inverse 2D FFT, real part, normalized by `h * w`.
fn ifft2d(data: &Array2<Complex<f64>>) -> Array2<f64> {
    let (h, w) = data.dim();
    let mut result = data.clone();
    transform_2d(&mut result, true);
    let norm = (h * w) as f64;
    result.mapv(|c| c.re / norm)
}

fn transform_2d(data: &mut Array2<Complex<f64>>, inverse: bool) {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let (fft_row, fft_col) = if inverse {
        (planner.plan_fft_inverse(w), planner.plan_fft_inverse(h))
    } else {
        (planner.plan_fft_forward(w), planner.plan_fft_forward(h))
    };

    for mut row in data.rows_mut() {
        let mut buffer: Vec<Complex<f64>> = row.to_vec();
        fft_row.process(&mut buffer);
        for (dst, src) in row.iter_mut().zip(buffer) {
            *dst = src;
        }
    }
    for mut col in data.columns_mut() {
        let mut buffer: Vec<Complex<f64>> = col.to_vec();
        fft_col.process(&mut buffer);
        for (dst, src) in col.iter_mut().zip(buffer) {
            *dst = src;
        }
    }
}

/// Resample a surface on a `1 / factor` lattice spanning its full extent.
///
/// Output `(i, j)` is the bicubic value at grid coordinate
/// `(i / factor, j / factor)`, so the output has `(n - 1) * factor + 1`
/// samples per axis and every input sample reappears exactly.
pub fn upsample_bicubic(surface: &Array2<f64>, factor: usize) -> Array2<f64> {
    let (h, w) = surface.dim();
    let factor = factor.max(1);
    let out_h = (h.max(1) - 1) * factor + 1;
    let out_w = (w.max(1) - 1) * factor + 1;
    let scale = factor as f64;

    let rows: Vec<Vec<f64>> = (0..out_h)
        .into_par_iter()
        .map(|i| {
            let y = i as f64 / scale;
            (0..out_w)
                .map(|j| bicubic_sample_clamped(surface, y, j as f64 / scale))
                .collect()
        })
        .collect();

    Array2::from_shape_fn((out_h, out_w), |(i, j)| rows[i][j])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cubic_kernel_interpolates() {
        assert_eq!(cubic_kernel(0.0), 1.0);
        assert_eq!(cubic_kernel(1.0), 0.0);
        assert_eq!(cubic_kernel(2.0), 0.0);
        let partition: f64 = (-1..=2).map(|k| cubic_kernel(0.3 - k as f64)).sum();
        assert!((partition - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_upsample_keeps_grid_samples() {
        let surface = Array2::from_shape_fn((5, 5), |(r, c)| ((r as f64) - 2.0).powi(2) + (c as f64 - 1.0).abs());
        let up = upsample_bicubic(&surface, 10);
        assert_eq!(up.dim(), (41, 41));
        for r in 0..5 {
            for c in 0..5 {
                assert!((up[[r * 10, c * 10]] - surface[[r, c]]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_integer_fourier_shift_matches_roll() {
        let image = Array2::from_shape_fn((32, 32), |(r, c)| {
            let d2 = (r as f64 - 14.0).powi(2) + (c as f64 - 17.0).powi(2);
            100.0 * (-d2 / 8.0).exp() + 1.0
        });
        let shifted = fourier_shift(&image, Shift::new(2.0, -1.0));
        let rolled = crate::align::roll_shift(&image, 2, -1, 0.0);
        for (a, b) in shifted.iter().zip(rolled.iter()) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn test_paraboloid_refinement_symmetric_peak() {
        let mut surface = Array2::<f64>::zeros((3, 3));
        surface[[1, 1]] = 4.0;
        surface[[0, 1]] = 2.0;
        surface[[2, 1]] = 2.0;
        surface[[1, 0]] = 1.0;
        surface[[1, 2]] = 3.0;
        let (dr, dc) = refine_peak_paraboloid(&surface, 1, 1);
        assert!(dr.abs() < 1e-12);
        assert!(dc > 0.0, "peak should lean toward the brighter column");
    }
}
