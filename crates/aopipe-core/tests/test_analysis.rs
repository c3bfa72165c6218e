mod common;

use std::fs;

use ndarray::Array2;

use aopipe_core::analysis::{analyze_image, analyze_reduced_image, find_sources};
use aopipe_core::contrast::{ContrastCurve, ContrastPoint};
use aopipe_core::error::AoError;
use aopipe_core::frame::{Center, FrameHeader};
use aopipe_core::io::write_fits;
use aopipe_core::pipeline::{AnalysisConfig, ContrastConfig};
use aopipe_core::summary::{find_products, nightly_contrast_curves, summarize_night};

use common::{gaussian_star, noise};

/// Bright primary at (90.2, 110.7) with a fainter companion at (140, 60).
fn binary_field() -> Array2<f64> {
    noise(201, 201, 100.0, 5.0, 17)
        + gaussian_star(201, 201, 90.2, 110.7, 5000.0, 2.5)
        + gaussian_star(201, 201, 140.0, 60.0, 800.0, 2.5)
}

fn curve(points: &[(f64, f64)]) -> ContrastCurve {
    ContrastCurve {
        points: points
            .iter()
            .map(|&(separation, delta_mag)| ContrastPoint {
                separation,
                delta_mag,
                uncertainty: 0.1,
            })
            .collect(),
    }
}

#[test]
fn test_sources_are_brightest_first() {
    let sources = find_sources(&binary_field(), 5.0, &AnalysisConfig::default());
    assert_eq!(sources.len(), 2, "{sources:?}");
    assert!(sources[0].peak > sources[1].peak);
    assert!((sources[0].row - 90.2).abs() < 0.3, "row {}", sources[0].row);
    assert!((sources[0].col - 110.7).abs() < 0.3, "col {}", sources[0].col);
    assert!((sources[1].row - 140.0).abs() < 0.3);
    assert!((sources[1].col - 60.0).abs() < 0.3);
    assert!(sources.iter().all(|s| s.fwhm == 5.0));
}

#[test]
fn test_analysis_converges_on_primary() {
    let analysis = analyze_image(&binary_field(), &AnalysisConfig::default()).unwrap();
    assert_eq!(analysis.center, Center::new(90.0, 111.0));
    assert!(analysis.converged);
    assert!(analysis.iterations >= 2 && analysis.iterations <= 3, "{}", analysis.iterations);
    // sigma 2.5 gives a true FWHM near 5.9 px.
    assert!(analysis.fwhm > 4.0 && analysis.fwhm < 8.0, "fwhm {}", analysis.fwhm);
    assert_eq!(analysis.sources.len(), 2);
}

#[test]
fn test_iteration_cap_is_respected() {
    let config = AnalysisConfig {
        max_iterations: 1,
        ..AnalysisConfig::default()
    };
    let analysis = analyze_image(&binary_field(), &config).unwrap();
    assert_eq!(analysis.iterations, 1);
    assert!(!analysis.converged);
    assert_eq!(analysis.center, Center::new(90.0, 111.0));
}

#[test]
fn test_blank_frame_has_no_sources() {
    let image = Array2::from_elem((64, 64), 3.0);
    let config = AnalysisConfig {
        max_search_fwhm: 12.0,
        ..AnalysisConfig::default()
    };
    assert!(find_sources(&image, 5.0, &config).is_empty());
    let err = analyze_image(&image, &config).unwrap_err();
    assert!(matches!(err, AoError::NoSourcesDetected { .. }), "{err}");
}

#[test]
fn test_reduced_image_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("T1").join("J");
    let (analysis, curve) = analyze_reduced_image(
        &binary_field(),
        "final_im.fits",
        0.033,
        &AnalysisConfig::default(),
        &ContrastConfig::default(),
        &out,
    )
    .unwrap();

    let details = fs::read_to_string(out.join("key_details.csv")).unwrap();
    let mut lines = details.lines();
    assert_eq!(lines.next(), Some("filename,xcen,ycen,fwhm"));
    let row: Vec<&str> = lines.next().unwrap().split(',').collect();
    assert_eq!(row[0], "final_im.fits");
    assert_eq!(row[1].parse::<f64>().unwrap(), 111.0);
    assert_eq!(row[2].parse::<f64>().unwrap(), 90.0);
    assert_eq!(row[3].parse::<f64>().unwrap(), analysis.fwhm);

    let stars = fs::read_to_string(out.join("detected_stars.csv")).unwrap();
    assert!(stars.starts_with("id,xcentroid,ycentroid,peak,flux,fwhm"));
    assert_eq!(stars.lines().count(), 3);

    let back = ContrastCurve::read_csv(&out.join("contrast_curve.csv")).unwrap();
    assert_eq!(back.separations(), curve.separations());
    assert!(curve.len() > 1);
}

#[test]
fn test_night_summary_collects_targets() {
    let dir = tempfile::tempdir().unwrap();
    let reduced = dir.path();
    for (target, filter) in [("T2", "Ks"), ("T1", "J")] {
        let out = reduced.join(target).join(filter);
        fs::create_dir_all(&out).unwrap();
        curve(&[(0.0, 0.0), (0.5, 3.0), (1.0, 5.5)])
            .write_csv(&out.join("contrast_curve.csv"))
            .unwrap();
    }
    fs::create_dir_all(reduced.join("flats")).unwrap();
    let image = gaussian_star(80, 80, 40.0, 40.0, 5000.0, 2.0);
    write_fits(&reduced.join("T1").join("J").join("final_im.fits"), &image, &FrameHeader::new()).unwrap();

    let products = find_products(reduced, "contrast_curve.csv").unwrap();
    let names: Vec<(&str, &str)> = products
        .iter()
        .map(|p| (p.target.as_str(), p.filter.as_str()))
        .collect();
    assert_eq!(names, [("T1", "J"), ("T2", "Ks")]);
    assert_eq!(nightly_contrast_curves(reduced).unwrap().len(), 2);

    let summary = summarize_night(reduced).unwrap();
    assert_eq!(summary.curves, 2);
    assert_eq!(summary.images, 1);
    assert!(summary.image_grid.unwrap().exists());

    let text = fs::read_to_string(summary.contrast_curves.unwrap()).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("target,filter,arcsec,dmag,dmrms"));
    assert!(lines.next().unwrap().starts_with("T1,J,0"));
    assert_eq!(text.lines().count(), 7);
}

#[test]
fn test_empty_night_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let summary = summarize_night(dir.path()).unwrap();
    assert_eq!(summary.curves, 0);
    assert!(summary.contrast_curves.is_none());
    assert!(summary.image_grid.is_none());
}
