use ndarray::Array2;

use aopipe_core::calib::calibrate_science;
use aopipe_core::error::AoError;
use aopipe_core::frame::{FrameHeader, HeaderValue, Shift};
use aopipe_core::instrument::{instrument_for, Instrument, Pharo, Sharcs};
use aopipe_core::pipeline::InstrumentKind;

#[test]
fn test_instrument_constants() {
    let sharcs = instrument_for(InstrumentKind::Sharcs, None).unwrap();
    assert_eq!(sharcs.plate_scale(), 0.033);
    assert_eq!(sharcs.file_prefix(), "s");

    let pharo = instrument_for(InstrumentKind::Pharo, None).unwrap();
    assert_eq!(pharo.plate_scale(), 0.025);
    assert_eq!(pharo.file_prefix(), "sph");
}

#[test]
fn test_sharcs_working_region_is_600_square() {
    let raw = Array2::from_shape_fn((1500, 2048), |(r, c)| (r * 10_000 + c) as f64);
    let cropped = Sharcs::new().crop_to_working_region(&raw);
    assert_eq!(cropped.dim(), (600, 600));
    assert_eq!(cropped[[0, 0]], raw[[450, 800]]);
    assert_eq!(cropped[[599, 599]], raw[[1049, 1399]]);
}

#[test]
fn test_sharcs_mask_repairs_flagged_pixels() {
    let mut mask = Array2::zeros((1500, 2048));
    mask[[750, 1100]] = 1.0;
    let sharcs = Sharcs::with_mask(&mask);

    let mut frame = Array2::from_elem((600, 600), 8.0);
    frame[[300, 300]] = 1.0e6;
    frame[[10, 10]] = f64::NAN;
    let repaired = sharcs.repair_bad_pixels(&frame);
    assert_eq!(repaired[[300, 300]], 8.0);
    assert_eq!(repaired[[10, 10]], 8.0);
}

#[test]
fn test_missing_integration_time() {
    let err = Pharo.true_integration_time(&FrameHeader::new()).unwrap_err();
    assert!(matches!(err, AoError::MissingKeyword(k) if k == "T_INT"));
}

#[test]
fn test_pharo_flat_substitution() {
    assert_eq!(Pharo.flat_filter("Br-gamma"), "K_short");
    assert_eq!(Pharo.flat_filter("J"), "J");
    assert_eq!(Sharcs::new().flat_filter("Br-gamma"), "Br-gamma");
}

#[test]
fn test_header_filter_wins_over_log() {
    let mut header = FrameHeader::new();
    header.set("FILTER", HeaderValue::Str("H".into()));
    assert_eq!(Pharo.filter_name(&header, "J"), "H");
    header.set("FILT1NAM", HeaderValue::Str("Unknown".into()));
    assert_eq!(Sharcs::new().filter_name(&header, "Ks"), "Ks");
}

#[test]
fn test_science_calibration_centres_star() {
    let flat = Array2::from_elem((41, 41), 2.0);
    let sky = Array2::from_elem((41, 41), 5.0);
    let mut raw = Array2::from_elem((41, 41), 10.0);
    for r in 10..15 {
        for c in 24..29 {
            raw[[r, c]] = 410.0;
        }
    }
    let (calibrated, shift) = calibrate_science(&raw, &flat, &sky, &Pharo).unwrap();
    // (410 / 2) - 5 = 200 inside the star, 0 elsewhere.
    assert_eq!(calibrated[[20, 20]], 200.0);
    assert_eq!(calibrated[[0, 40]], 0.0);
    // The filtered plateau spans rows 11..=13, cols 25..=27; its first
    // pixel lands on the centre.
    assert_eq!(shift, Shift::new(9.0, -5.0));
}

#[test]
fn test_calibration_rejects_mismatched_flat() {
    let raw = Array2::zeros((10, 10));
    let flat = Array2::from_elem((12, 12), 1.0);
    let sky = Array2::zeros((10, 10));
    assert!(matches!(
        calibrate_science(&raw, &flat, &sky, &Pharo),
        Err(AoError::DimensionMismatch { .. })
    ));
}
