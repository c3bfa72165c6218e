use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{AoError, Result};
use crate::stats::median_in_place;

/// Pixel-wise median across equally shaped images, ignoring NaNs.
///
/// A pixel that is NaN in every image stays NaN. Parallelizes at the row
/// level for large images.
pub fn nan_median_stack(images: &[Array2<f64>]) -> Result<Array2<f64>> {
    let first = images.first().ok_or(AoError::EmptySequence)?;
    let (h, w) = first.dim();
    for image in images {
        let (rows, cols) = image.dim();
        if (rows, cols) != (h, w) {
            return Err(AoError::DimensionMismatch {
                expected_rows: h,
                expected_cols: w,
                rows,
                cols,
            });
        }
    }

    let n = images.len();
    let median_row = |row: usize| -> Vec<f64> {
        let mut pixel_values = Vec::with_capacity(n);
        (0..w)
            .map(|col| {
                pixel_values.clear();
                pixel_values.extend(images.iter().map(|im| im[[row, col]]).filter(|v| !v.is_nan()));
                median_in_place(&mut pixel_values)
            })
            .collect()
    };

    let rows: Vec<Vec<f64>> = if h * w >= PARALLEL_PIXEL_THRESHOLD && n > 1 {
        (0..h).into_par_iter().map(median_row).collect()
    } else {
        (0..h).map(median_row).collect()
    };

    let mut result = Array2::<f64>::zeros((h, w));
    for (row, row_data) in rows.into_iter().enumerate() {
        for (col, val) in row_data.into_iter().enumerate() {
            result[[row, col]] = val;
        }
    }
    Ok(result)
}
