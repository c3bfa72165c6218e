mod common;

use ndarray::{array, Array2};

use aopipe_core::align::RegistrationStrategy;
use aopipe_core::error::AoError;
use aopipe_core::frame::Shift;
use aopipe_core::pipeline::{RegistrationConfig, StackConfig};
use aopipe_core::stack::{nan_median_stack, stack_frames};

use common::{gaussian_star, peak_position};

fn bruteforce_config() -> RegistrationConfig {
    RegistrationConfig {
        peak_min_distance: 10,
        ..RegistrationConfig::default()
    }
}

#[test]
fn test_median_stack_ignores_nan() {
    let a = array![[1.0, f64::NAN], [3.0, f64::NAN]];
    let b = array![[2.0, 5.0], [100.0, f64::NAN]];
    let c = array![[9.0, 7.0], [4.0, f64::NAN]];
    let stacked = nan_median_stack(&[a, b, c]).unwrap();
    assert_eq!(stacked[[0, 0]], 2.0);
    assert_eq!(stacked[[0, 1]], 6.0);
    assert_eq!(stacked[[1, 0]], 4.0);
    assert!(stacked[[1, 1]].is_nan());
}

#[test]
fn test_median_stack_rejects_mismatched_frames() {
    let result = nan_median_stack(&[Array2::zeros((4, 4)), Array2::zeros((4, 5))]);
    assert!(matches!(
        result,
        Err(AoError::DimensionMismatch { rows: 4, cols: 5, .. })
    ));
}

#[test]
fn test_median_stack_empty_is_error() {
    assert!(matches!(nan_median_stack(&[]), Err(AoError::EmptySequence)));
}

#[test]
fn test_stack_aligns_and_crops() {
    let positions = [(40.0, 52.0), (55.0, 45.0), (50.0, 50.0), (47.0, 58.0)];
    let frames: Vec<Array2<f64>> = positions
        .iter()
        .map(|&(r, c)| gaussian_star(100, 100, r, c, 1000.0, 2.0))
        .collect();

    let result = stack_frames(
        &frames,
        RegistrationStrategy::Bruteforce,
        None,
        &bruteforce_config(),
        &StackConfig {
            final_size: Some(40),
        },
        |_| {},
    )
    .unwrap();

    assert_eq!(result.image.dim(), (40, 40));
    assert_eq!(peak_position(&result.image), (20, 20));
    assert_eq!(result.image[[20, 20]], 1000.0);

    assert_eq!(result.shifts.len(), 4);
    for (i, (frame_shift, &(r, c))) in result.shifts.iter().zip(&positions).enumerate() {
        assert_eq!(frame_shift.index, i);
        assert_eq!(frame_shift.shift, Shift::new(50.0 - r, 50.0 - c));
    }
    assert_eq!(result.fallbacks(RegistrationStrategy::Bruteforce), 0);
    assert!(result.residual_maps.is_empty());
}

#[test]
fn test_fallback_frames_still_contribute() {
    let mut frames: Vec<Array2<f64>> = (0..3)
        .map(|i| gaussian_star(64, 64, 30.0 + i as f64, 33.0, 1000.0, 2.0))
        .collect();
    frames.push(Array2::zeros((64, 64)));

    let config = RegistrationConfig {
        upsample: 4,
        ..bruteforce_config()
    };
    let result = stack_frames(
        &frames,
        RegistrationStrategy::Bruteforce,
        None,
        &config,
        &StackConfig { final_size: None },
        |_| {},
    )
    .unwrap();

    assert_eq!(result.image.dim(), (64, 64));
    assert_eq!(result.fallbacks(RegistrationStrategy::Bruteforce), 1);
    assert_eq!(result.shifts[3].strategy, RegistrationStrategy::Saturated);
    assert_eq!(result.residual_maps.len(), 1);
    assert_eq!(result.residual_maps[0].0, 3);
    // Three aligned stars and one blank frame: the median is the mean of
    // the middle pair, 1000 and 1000.
    assert_eq!(result.image[[32, 32]], 1000.0);
}

#[test]
fn test_final_size_larger_than_frame_keeps_frame() {
    let frames = vec![gaussian_star(50, 50, 25.0, 25.0, 10.0, 2.0)];
    let result = stack_frames(
        &frames,
        RegistrationStrategy::Bruteforce,
        None,
        &bruteforce_config(),
        &StackConfig::default(),
        |_| {},
    )
    .unwrap();
    assert_eq!(result.image.dim(), (50, 50));
}
