use ndarray::Array2;
use tracing::warn;

use crate::consts::SIGMA_CLIP_MAX_ITERS;
use crate::frame::{geometric_center, Center};
use crate::geometry::{CircularAnnulus, CircularAperture};
use crate::pipeline::config::ContrastConfig;
use crate::stats::{robust::population_std, sigma_clipped_stats};

/// Background-subtracted aperture flux and its uncertainty, in counts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Photometry {
    pub flux: f64,
    pub error: f64,
}

impl Photometry {
    pub fn snr(&self) -> f64 {
        self.flux / self.error
    }
}

/// Aperture photometry of the source at `position` (default `shape / 2`).
///
/// The aperture has radius `fwhm` and uses exact pixel overlap. The sky is
/// the 3σ-clipped median of the annulus from `sky_inner_fwhm * fwhm` to
/// `sky_inner_fwhm * fwhm + sky_width`. The error budget adds the sky
/// scatter over the aperture, a photon term and the mean-sky uncertainty.
pub fn run_ap_phot(
    data: &Array2<f64>,
    fwhm: f64,
    position: Option<Center>,
    config: &ContrastConfig,
) -> Photometry {
    let center = position.unwrap_or_else(|| geometric_center(data));
    let aperture = CircularAperture::new(center, fwhm);
    let sky_inner = fwhm * config.sky_inner_fwhm;
    let sky_annulus = CircularAnnulus::new(center, sky_inner, sky_inner + config.sky_width);

    let sky_pixels: Vec<f64> = sky_annulus
        .center_pixels(data)
        .into_iter()
        .filter(|v| v.is_finite())
        .collect();
    if sky_pixels.is_empty() {
        warn!(
            row = center.row,
            col = center.col,
            "sky annulus has no valid pixels; photometry undefined"
        );
        return Photometry {
            flux: f64::NAN,
            error: f64::NAN,
        };
    }

    let sky_median = sigma_clipped_stats(&sky_pixels, 3.0, SIGMA_CLIP_MAX_ITERS).median;
    let (flux, _) = aperture.weighted_sum(data, sky_median);

    let std = population_std(&sky_pixels);
    let skyvar = std * std;
    let area = aperture.area();
    let sky_err = area * skyvar;
    let photon_err = if flux > 0.0 { 1.0 } else { 0.0 } / config.photons_per_adu;
    let mean_sky_err = skyvar / sky_annulus.area() * area * area;

    Photometry {
        flux,
        error: (sky_err + photon_err + mean_sky_err).sqrt(),
    }
}
