use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array2;
use rayon::prelude::*;
use tracing::warn;

use crate::consts::PARALLEL_FRAME_THRESHOLD;
use crate::error::{AoError, Result};
use crate::frame::Center;
use crate::pipeline::config::RegistrationConfig;

use super::bruteforce::register_bruteforce;
use super::psf_fit::register_psf_fit;
use super::registration::{Registration, RegistrationStrategy};
use super::saturated::register_saturated;

/// Register one frame with the requested per-frame strategy.
///
/// A brute-force miss escalates once to the saturated strategy, which
/// always produces a result. PSF fitting works on whole sets, so a single
/// frame requested with it is treated as a one-frame set.
pub fn register_frame(
    image: &Array2<f64>,
    strategy: RegistrationStrategy,
    rough_center: Option<Center>,
    config: &RegistrationConfig,
) -> Registration {
    match strategy {
        RegistrationStrategy::Bruteforce => match register_bruteforce(image, rough_center, config) {
            Some(registration) => registration,
            None => {
                warn!("no unambiguous peak found; falling back to saturated registration");
                register_saturated(image, rough_center, config)
            }
        },
        RegistrationStrategy::Saturated => register_saturated(image, rough_center, config),
        RegistrationStrategy::PsfFit => {
            match register_psf_fit(std::slice::from_ref(image), config, |_| {}) {
                Ok((mut registrations, _)) if !registrations.is_empty() => registrations.remove(0),
                _ => register_saturated(image, rough_center, config),
            }
        }
    }
}

/// Register every frame of a set, reporting progress.
///
/// Frames are registered in parallel above `PARALLEL_FRAME_THRESHOLD`;
/// results keep input order. `on_frame_done` receives the running count of
/// finished frames.
pub fn register_frames_with_progress<F>(
    frames: &[Array2<f64>],
    strategy: RegistrationStrategy,
    rough_center: Option<Center>,
    config: &RegistrationConfig,
    on_frame_done: F,
) -> Result<Vec<Registration>>
where
    F: Fn(usize) + Send + Sync,
{
    if frames.is_empty() {
        return Err(AoError::EmptySequence);
    }

    if strategy == RegistrationStrategy::PsfFit {
        return register_psf_fit(frames, config, on_frame_done).map(|(registrations, _)| registrations);
    }

    let counter = AtomicUsize::new(0);
    let register = |frame: &Array2<f64>| {
        let registration = register_frame(frame, strategy, rough_center, config);
        let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
        on_frame_done(done);
        registration
    };

    let registrations = if frames.len() >= PARALLEL_FRAME_THRESHOLD {
        frames.par_iter().map(register).collect()
    } else {
        frames.iter().map(register).collect()
    };
    Ok(registrations)
}
