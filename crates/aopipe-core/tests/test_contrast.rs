mod common;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use aopipe_core::contrast::{
    compute_contrast_curve, contrast_curve_core, radius_size, run_ap_phot, ContrastCurve,
};
use aopipe_core::error::AoError;
use aopipe_core::frame::Center;
use aopipe_core::pipeline::ContrastConfig;

use common::{gaussian_star, noise};

#[test]
fn test_radius_size_is_smaller_of_arcsec_and_fwhm() {
    assert_abs_diff_eq!(radius_size(4.0, 0.033), 4.0);
    assert_abs_diff_eq!(radius_size(50.0, 0.033), 1.0 / 0.033);
}

#[test]
fn test_annulus_bounds_and_separations() {
    let image = Array2::zeros((200, 200));
    let (ps, fwhm, rs) = (0.033, 4.0, 3.0);
    let profile = contrast_curve_core(&image, ps, fwhm, Some(rs), None, &ContrastConfig::default()).unwrap();
    assert!(!profile.is_empty());
    assert_eq!(profile.center, Center::new(99.5, 99.5));
    for (j, annulus) in profile.annuli.iter().enumerate() {
        let r_in = j as f64 * rs + fwhm;
        let r_out = (j + 1) as f64 * rs + fwhm;
        assert_abs_diff_eq!(annulus.r_in, r_in, epsilon = 1e-12);
        assert_abs_diff_eq!(annulus.r_out, r_out, epsilon = 1e-12);
        assert_abs_diff_eq!(annulus.separation, (r_in + r_out) / 2.0 * ps, epsilon = 1e-12);
        assert_eq!(annulus.sectors.len(), 12);
    }
}

#[test]
fn test_wider_annuli_give_fewer_bins() {
    let image = Array2::zeros((600, 600));
    let config = ContrastConfig::default();
    let counts: Vec<usize> = [1.0, 3.0, 6.0]
        .iter()
        .map(|&rs| contrast_curve_core(&image, 0.033, 4.0, Some(rs), None, &config).unwrap().len())
        .collect();
    assert!(counts[0] > counts[1], "{counts:?}");
    assert!(counts[1] > counts[2], "{counts:?}");
}

#[test]
fn test_separation_limit_stops_annuli() {
    let image = Array2::zeros((600, 600));
    let config = ContrastConfig {
        max_separation_arcsec: 2.0,
        ..ContrastConfig::default()
    };
    let profile = contrast_curve_core(&image, 0.033, 4.0, Some(4.0), None, &config).unwrap();
    for annulus in &profile.annuli {
        assert!(annulus.r_in * 0.033 <= 2.0);
    }
    // r_in = 4 j + 4 <= 2 / 0.033 = 60.6 gives j = 0..=14.
    assert_eq!(profile.len(), 15);
}

#[test]
fn test_constant_image_has_undefined_contrast() {
    let image = Array2::from_elem((151, 151), 7.0);
    let curve = compute_contrast_curve(&image, 4.0, 0.033, None, &ContrastConfig::default()).unwrap();
    assert!(curve.len() > 1);
    assert_eq!(curve.separations()[0], 0.0);
    assert!(curve.contrasts().iter().all(|v| v.is_nan()));
}

#[test]
fn test_constant_flux_gives_equal_annulus_medians() {
    let image = Array2::from_elem((600, 600), 1000.0);
    let profile = contrast_curve_core(&image, 0.0333, 4.0, Some(4.0), None, &ContrastConfig::default()).unwrap();
    assert!(profile.len() > 50);
    for annulus in &profile.annuli {
        if annulus.r_out <= 299.5 {
            assert!(annulus.sectors.iter().all(|s| s.pixels > 0), "r_in {}", annulus.r_in);
        }
        for stats in annulus.sectors.iter().filter(|s| s.pixels > 0) {
            assert_eq!(stats.median, 1000.0, "r_in {}", annulus.r_in);
        }
    }
}

#[test]
fn test_zero_image_contrast_is_all_nan() {
    let image = Array2::zeros((201, 201));
    let curve = compute_contrast_curve(&image, 4.0, 0.033, None, &ContrastConfig::default()).unwrap();
    assert!(curve.len() > 1);
    assert!(curve.contrasts().iter().all(|v| v.is_nan()));
    assert!(curve.uncertainties().iter().all(|v| v.is_nan()));
}

#[test]
fn test_non_positive_fwhm_is_rejected() {
    let image = Array2::from_elem((101, 101), 1.0);
    let config = ContrastConfig::default();
    for fwhm in [0.0, -2.0, f64::NAN] {
        let err = compute_contrast_curve(&image, fwhm, 0.033, None, &config).unwrap_err();
        assert!(matches!(err, AoError::InvalidParameter { name: "fwhm", .. }), "{err}");
        assert!(contrast_curve_core(&image, 0.033, fwhm, None, None, &config).is_err());
    }
    let err = contrast_curve_core(&image, 0.033, 4.0, Some(0.0), None, &config).unwrap_err();
    assert!(matches!(err, AoError::InvalidParameter { name: "radius size", .. }), "{err}");
    assert!(compute_contrast_curve(&image, 4.0, 0.0, None, &config).is_err());
}

#[test]
fn test_output_arrays_have_equal_length() {
    let image = noise(151, 151, 100.0, 5.0, 3) + gaussian_star(151, 151, 75.0, 75.0, 20_000.0, 2.0);
    let curve = compute_contrast_curve(&image, 4.0, 0.033, None, &ContrastConfig::default()).unwrap();
    assert_eq!(curve.separations().len(), curve.contrasts().len());
    assert_eq!(curve.contrasts().len(), curve.uncertainties().len());
}

#[test]
fn test_contrast_deepens_with_separation() {
    let star = gaussian_star(301, 301, 150.0, 150.0, 50_000.0, 2.0);
    let image = noise(301, 301, 100.0, 5.0, 11) + star;
    let curve = compute_contrast_curve(&image, 4.0, 0.033, None, &ContrastConfig::default()).unwrap();

    let first = curve.points[0];
    assert_eq!(first.separation, 0.0);
    assert_abs_diff_eq!(first.delta_mag, 0.0, epsilon = 1e-12);

    let separations = curve.separations();
    assert!(separations.windows(2).all(|w| w[0] < w[1]));

    let inner = curve.points[1].delta_mag;
    assert!(inner.is_finite());
    let outer = curve
        .contrasts()
        .into_iter()
        .rev()
        .find(|v| v.is_finite())
        .unwrap();
    assert!(outer - inner > 2.0, "inner {inner}, outer {outer}");
}

#[test]
fn test_contrast_is_deterministic_for_a_seed() {
    let image = noise(121, 121, 50.0, 3.0, 5) + gaussian_star(121, 121, 60.0, 60.0, 10_000.0, 2.0);
    let config = ContrastConfig::default();
    let a = compute_contrast_curve(&image, 4.0, 0.025, None, &config).unwrap();
    let b = compute_contrast_curve(&image, 4.0, 0.025, None, &config).unwrap();
    assert_eq!(a.separations(), b.separations());
    for (x, y) in a.contrasts().iter().zip(b.contrasts()) {
        assert!((x.is_nan() && y.is_nan()) || *x == y);
    }
}

#[test]
fn test_aperture_photometry_recovers_flux() {
    // Total flux of a circular Gaussian is 2 pi sigma^2 peak; an aperture
    // of radius 3 sigma holds 1 - exp(-4.5) of it.
    let sigma = 2.0;
    let image = gaussian_star(201, 201, 100.0, 100.0, 1000.0, sigma) + 20.0;
    let phot = run_ap_phot(&image, 3.0 * sigma, None, &ContrastConfig::default());
    let expected = 2.0 * std::f64::consts::PI * sigma * sigma * 1000.0 * (1.0 - (-4.5f64).exp());
    assert!((phot.flux - expected).abs() / expected < 0.02, "flux {}", phot.flux);
    assert!(phot.error > 0.0);
}

#[test]
fn test_photon_term_counts_positive_flux_once() {
    // A flat sky leaves only the photon term in the error budget.
    let config = ContrastConfig::default();
    let bright = gaussian_star(201, 201, 100.0, 100.0, 1000.0, 2.0) + 20.0;
    let phot = run_ap_phot(&bright, 6.0, None, &config);
    assert!(phot.flux > 1000.0);
    assert_abs_diff_eq!(phot.error, 1.0 / config.photons_per_adu.sqrt(), epsilon = 1e-6);

    let dark = 20.0 - gaussian_star(201, 201, 100.0, 100.0, 10.0, 2.0);
    let phot = run_ap_phot(&dark, 6.0, None, &config);
    assert!(phot.flux < 0.0);
    assert_abs_diff_eq!(phot.error, 0.0, epsilon = 1e-6);
}

#[test]
fn test_curve_csv_keeps_nan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contrast_curve.csv");
    let image = Array2::from_elem((101, 101), 1.0);
    let curve = compute_contrast_curve(&image, 4.0, 0.033, None, &ContrastConfig::default()).unwrap();
    curve.write_csv(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("arcsec,dmag,dmrms"));

    let back = ContrastCurve::read_csv(&path).unwrap();
    assert_eq!(back.separations(), curve.separations());
    assert!(back.contrasts().iter().all(|v| v.is_nan()));
}
