use ndarray::Array2;
use tracing::debug;

use crate::consts::ROUGH_WINDOW_DIVISOR;
use crate::frame::{geometric_center, Center, Shift};
use crate::pipeline::config::RegistrationConfig;

use super::peaks::{search_threshold, PeakSearch};
use super::registration::{Registration, RegistrationStrategy};
use super::roll::{roll_shift, Window};

/// Locate the star for brute-force registration.
///
/// Without a rough centre the whole frame is searched (with the usual
/// `min_distance` border excluded). With one, only the square sub-window of
/// half-width `rows / 50` around it is searched and the peak is mapped back
/// to frame coordinates.
pub fn find_bruteforce_peak(
    image: &Array2<f64>,
    rough_center: Option<Center>,
    config: &RegistrationConfig,
) -> PeakSearch {
    match rough_center {
        None => search_threshold(image, config.peak_min_distance, true),
        Some(rough) => {
            let half = image.nrows() / ROUGH_WINDOW_DIVISOR;
            let window = Window::around(rough, half, image.dim());
            if window.is_empty() {
                return PeakSearch::NotFound;
            }
            let sub = window.extract(image);
            match search_threshold(&sub, config.peak_min_distance, false) {
                PeakSearch::Found(c) => PeakSearch::Found(window.to_image(c.row, c.col)),
                PeakSearch::NotFound => PeakSearch::NotFound,
            }
        }
    }
}

/// Move the detected peak to the geometric centre with an integer roll.
///
/// `None` when no unambiguous peak exists; the caller decides the fallback.
pub fn register_bruteforce(
    image: &Array2<f64>,
    rough_center: Option<Center>,
    config: &RegistrationConfig,
) -> Option<Registration> {
    let peak = find_bruteforce_peak(image, rough_center, config).center()?;
    let target = geometric_center(image);
    let shift = Shift::between(peak, target);
    debug!(
        peak_row = peak.row,
        peak_col = peak.col,
        drow = shift.drow,
        dcol = shift.dcol,
        "bruteforce peak found"
    );

    Some(Registration {
        image: roll_shift(image, shift.drow as isize, shift.dcol as isize, 0.0),
        shift,
        strategy: RegistrationStrategy::Bruteforce,
        residual_map: None,
    })
}
