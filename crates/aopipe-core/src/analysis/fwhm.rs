use ndarray::Array2;

use crate::consts::MIN_FWHM;
use crate::frame::Center;

/// Radius (pixels) searched for the peak value around the centre.
const PEAK_RADIUS: f64 = 5.0;

/// Number of pixels closest in value to half maximum that are considered.
const HALF_MAX_CANDIDATES: usize = 10;

/// Rough FWHM of the star at `center`.
///
/// Half maximum is `floor(max / 2)` of the pixels within 5 px of the
/// centre. Of the ten pixels whose values lie closest to it, the one
/// nearest the centre sets the radius; the FWHM is twice that distance and
/// never less than `min_fwhm`.
pub fn estimate_fwhm(image: &Array2<f64>, center: Center, min_fwhm: f64) -> f64 {
    let distance = |r: usize, c: usize| Center::new(r as f64, c as f64).distance(&center);

    let peak = image
        .indexed_iter()
        .filter(|&((r, c), v)| v.is_finite() && distance(r, c) < PEAK_RADIUS)
        .map(|(_, &v)| v)
        .fold(f64::NEG_INFINITY, f64::max);
    if !peak.is_finite() {
        return min_fwhm;
    }
    let half_max = (peak / 2.0).floor();

    let mut candidates: Vec<((usize, usize), f64)> = image
        .indexed_iter()
        .filter(|(_, v)| v.is_finite())
        .map(|(idx, &v)| (idx, (v - half_max).abs()))
        .collect();
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
    candidates.truncate(HALF_MAX_CANDIDATES);

    let radius = candidates
        .iter()
        .map(|&((r, c), _)| distance(r, c))
        .fold(f64::INFINITY, f64::min);
    if !radius.is_finite() {
        return min_fwhm;
    }
    (2.0 * radius).max(min_fwhm)
}

/// [`estimate_fwhm`] with the default lower bound.
pub fn estimate_fwhm_default(image: &Array2<f64>, center: Center) -> f64 {
    estimate_fwhm(image, center, MIN_FWHM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_fwhm() {
        // sigma = 4 px, FWHM ~ 9.4 px.
        let sigma: f64 = 4.0;
        let image = Array2::from_shape_fn((101, 101), |(r, c)| {
            let d2 = (r as f64 - 50.0).powi(2) + (c as f64 - 50.0).powi(2);
            10_000.0 * (-d2 / (2.0 * sigma * sigma)).exp()
        });
        let fwhm = estimate_fwhm(&image, Center::new(50.0, 50.0), 2.0);
        assert!((fwhm - 9.42).abs() < 1.0, "fwhm = {fwhm}");
    }

    #[test]
    fn test_point_source_floors_at_minimum() {
        let mut image = Array2::zeros((21, 21));
        image[[10, 10]] = 100.0;
        image[[10, 11]] = 50.0;
        assert_eq!(estimate_fwhm(&image, Center::new(10.0, 10.0), 2.0), 2.0);
    }
}
