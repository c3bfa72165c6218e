mod common;

use ndarray::Array2;

use aopipe_core::align::bruteforce::find_bruteforce_peak;
use aopipe_core::align::peaks::search_threshold;
use aopipe_core::align::{
    register_frame, register_frames_with_progress, register_psf_fit, PeakSearch, RegistrationStrategy,
};
use aopipe_core::error::AoError;
use aopipe_core::frame::{Center, Shift};
use aopipe_core::pipeline::{PsfFitConfig, RegistrationConfig};

use common::{flat_top_disk, gaussian_star, noise, peak_position};

fn bruteforce_config(min_distance: usize) -> RegistrationConfig {
    RegistrationConfig {
        peak_min_distance: min_distance,
        ..RegistrationConfig::default()
    }
}

#[test]
fn test_bruteforce_rolls_peak_to_center() {
    let image = gaussian_star(200, 200, 80.0, 120.0, 1000.0, 2.0);
    let reg = register_frame(&image, RegistrationStrategy::Bruteforce, None, &bruteforce_config(20));
    assert_eq!(reg.strategy, RegistrationStrategy::Bruteforce);
    assert_eq!(reg.shift, Shift::new(20.0, -20.0));
    assert_eq!(peak_position(&reg.image), (100, 100));
    assert_eq!(reg.image[[100, 100]], 1000.0);
    assert!(reg.residual_map.is_none());
}

#[test]
fn test_threshold_search_picks_brightest_of_few_peaks() {
    let image = gaussian_star(128, 128, 40.0, 40.0, 900.0, 2.0)
        + gaussian_star(128, 128, 90.0, 80.0, 1200.0, 2.0);
    assert_eq!(search_threshold(&image, 10, true), PeakSearch::Found(Center::new(90.0, 80.0)));
}

#[test]
fn test_blank_frame_has_no_peak() {
    let image = Array2::zeros((64, 64));
    assert_eq!(search_threshold(&image, 10, true), PeakSearch::NotFound);
}

#[test]
fn test_bruteforce_miss_falls_back_to_saturated() {
    let image = Array2::zeros((64, 64));
    let config = RegistrationConfig {
        upsample: 4,
        ..bruteforce_config(10)
    };
    let reg = register_frame(&image, RegistrationStrategy::Bruteforce, None, &config);
    assert_eq!(reg.strategy, RegistrationStrategy::Saturated);
    assert!(reg.residual_map.is_some());
}

#[test]
fn test_rough_center_selects_primary_of_wide_binary() {
    // The companion is brighter; only the window around the rough centre
    // is searched.
    let image = gaussian_star(128, 128, 40.0, 40.0, 1000.0, 2.0)
        + gaussian_star(128, 128, 90.0, 90.0, 2000.0, 2.0);
    let rough = Some(Center::new(41.0, 39.0));
    let config = RegistrationConfig::default();

    assert_eq!(
        find_bruteforce_peak(&image, rough, &config),
        PeakSearch::Found(Center::new(40.0, 40.0))
    );
    let reg = register_frame(&image, RegistrationStrategy::Bruteforce, rough, &config);
    assert_eq!(reg.shift, Shift::new(24.0, 24.0));
    assert_eq!(reg.image[[64, 64]], 1000.0);
}

#[test]
fn test_saturated_core_is_centred() {
    let image = flat_top_disk(64, 64, 29.0, 35.0, 6.0, 5000.0);
    let config = RegistrationConfig {
        upsample: 10,
        ..RegistrationConfig::default()
    };
    let reg = register_frame(&image, RegistrationStrategy::Saturated, None, &config);
    assert_eq!(reg.strategy, RegistrationStrategy::Saturated);
    assert!((reg.shift.drow - 3.0).abs() < 0.01, "drow = {}", reg.shift.drow);
    assert!((reg.shift.dcol + 3.0).abs() < 0.01, "dcol = {}", reg.shift.dcol);

    let map = reg.residual_map.unwrap();
    assert_eq!(map.dim(), (21, 21));
    let max = map.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert!((max - 1.0).abs() < 1e-12);
    assert_eq!(map[[13, 7]], 0.0);
}

#[test]
fn test_saturated_recovers_subpixel_offset() {
    // Clipped Gaussian core, off centre by a fraction of a pixel.
    let image = gaussian_star(64, 64, 32.0 - 3.37, 32.0 + 2.81, 20_000.0, 3.0).mapv(|v| v.min(5000.0));
    let config = RegistrationConfig::default();
    assert_eq!(config.upsample, 100);
    let reg = register_frame(&image, RegistrationStrategy::Saturated, None, &config);
    assert_eq!(reg.strategy, RegistrationStrategy::Saturated);
    assert!((reg.shift.drow - 3.37).abs() <= 0.01 + 1e-9, "drow = {}", reg.shift.drow);
    assert!((reg.shift.dcol + 2.81).abs() <= 0.01 + 1e-9, "dcol = {}", reg.shift.dcol);
}

#[test]
fn test_saturated_rough_center_precentres_primary() {
    let image = flat_top_disk(128, 128, 40.0, 44.0, 1.5, 5000.0)
        + flat_top_disk(128, 128, 100.0, 100.0, 1.5, 5000.0);
    let config = RegistrationConfig {
        search_radius: 3,
        upsample: 10,
        ..RegistrationConfig::default()
    };
    let reg = register_frame(
        &image,
        RegistrationStrategy::Saturated,
        Some(Center::new(40.0, 44.0)),
        &config,
    );
    assert!((reg.shift.drow - 24.0).abs() < 0.01, "drow = {}", reg.shift.drow);
    assert!((reg.shift.dcol - 20.0).abs() < 0.01, "dcol = {}", reg.shift.dcol);
}

#[test]
fn test_progress_reports_every_frame() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let frames: Vec<Array2<f64>> = (0..5)
        .map(|i| gaussian_star(96, 96, 40.0 + i as f64, 50.0, 1000.0, 2.0))
        .collect();
    let calls = AtomicUsize::new(0);
    let registrations = register_frames_with_progress(
        &frames,
        RegistrationStrategy::Bruteforce,
        None,
        &bruteforce_config(10),
        |_| {
            calls.fetch_add(1, Ordering::Relaxed);
        },
    )
    .unwrap();

    assert_eq!(calls.load(Ordering::Relaxed), 5);
    for (i, reg) in registrations.iter().enumerate() {
        assert_eq!(reg.shift, Shift::new(8.0 - i as f64, -2.0));
    }
}

#[test]
fn test_empty_set_is_an_error() {
    let result = register_frames_with_progress(
        &[],
        RegistrationStrategy::Saturated,
        None,
        &RegistrationConfig::default(),
        |_| {},
    );
    assert!(matches!(result, Err(AoError::EmptySequence)));
}

#[test]
fn test_psf_fit_recovers_subpixel_centre() {
    let frames: Vec<Array2<f64>> = (0..4)
        .map(|i| gaussian_star(64, 64, 30.4, 33.7, 2000.0, 2.0) + noise(64, 64, 10.0, 1.0, 100 + i))
        .collect();
    let config = RegistrationConfig {
        psf_fit: PsfFitConfig {
            walkers: 16,
            steps: 120,
            burn_in: 60,
            ..PsfFitConfig::default()
        },
        ..RegistrationConfig::default()
    };

    let (registrations, shape) = register_psf_fit(&frames, &config, |_| {}).unwrap();
    assert_eq!(registrations.len(), 4);
    for reg in &registrations {
        assert_eq!(reg.strategy, RegistrationStrategy::PsfFit);
        assert!((reg.shift.drow - 1.6).abs() < 0.5, "drow = {}", reg.shift.drow);
        assert!((reg.shift.dcol + 1.7).abs() < 0.5, "dcol = {}", reg.shift.dcol);
    }
    assert!((shape.sigma_x - 2.0).abs() < 1.0, "sigma_x = {}", shape.sigma_x);
    assert!((shape.sigma_y - 2.0).abs() < 1.0, "sigma_y = {}", shape.sigma_y);
}

#[test]
fn test_single_frame_psf_fit_is_fitted() {
    let image = gaussian_star(64, 64, 30.4, 33.7, 2000.0, 2.0) + noise(64, 64, 10.0, 1.0, 200);
    let config = RegistrationConfig {
        psf_fit: PsfFitConfig {
            walkers: 16,
            steps: 120,
            burn_in: 60,
            ..PsfFitConfig::default()
        },
        ..RegistrationConfig::default()
    };
    let reg = register_frame(&image, RegistrationStrategy::PsfFit, None, &config);
    assert_eq!(reg.strategy, RegistrationStrategy::PsfFit);
    assert!((reg.shift.drow - 1.6).abs() < 0.5, "drow = {}", reg.shift.drow);
    assert!((reg.shift.dcol + 1.7).abs() < 0.5, "dcol = {}", reg.shift.dcol);
}
