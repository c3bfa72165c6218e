use ndarray::Array2;

use crate::error::{AoError, Result};

/// Weighted standard deviation of `values` under fractional `weights`.
///
/// `N` is the number of strictly positive weights and the variance is
/// normalised by `(N - 1) / N * sum(weights)`. Returns NaN when `N <= 1`.
pub fn weighted_std(values: &Array2<f64>, weights: &Array2<f64>) -> Result<f64> {
    if values.dim() != weights.dim() {
        let (expected_rows, expected_cols) = values.dim();
        let (rows, cols) = weights.dim();
        return Err(AoError::DimensionMismatch {
            expected_rows,
            expected_cols,
            rows,
            cols,
        });
    }

    let n = weights.iter().filter(|&&w| w > 0.0).count();
    if n <= 1 {
        return Ok(f64::NAN);
    }

    let weight_sum: f64 = weights.sum();
    let weighted_mean = values
        .iter()
        .zip(weights.iter())
        .map(|(v, w)| v * w)
        .sum::<f64>()
        / weight_sum;
    let numerator: f64 = values
        .iter()
        .zip(weights.iter())
        .map(|(v, w)| w * (v - weighted_mean).powi(2))
        .sum();

    let n = n as f64;
    Ok((numerator / ((n - 1.0) / n * weight_sum)).sqrt())
}
