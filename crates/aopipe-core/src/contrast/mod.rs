pub mod curve;
pub mod injection;
pub mod photometry;
pub mod profile;

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::Result;
use crate::frame::Center;
use crate::pipeline::config::ContrastConfig;
use crate::stats::{nan_median, nan_std};

pub use curve::{ContrastCurve, ContrastPoint};
pub use injection::{detectable_flux, InjectionBackground};
pub use photometry::{run_ap_phot, Photometry};
pub use profile::{contrast_curve_core, AnnulusStats, BackgroundProfile};

/// Annulus width: one arcsecond or one FWHM, whichever is smaller.
pub fn radius_size(fwhm: f64, plate_scale: f64) -> f64 {
    (1.0 / plate_scale).min(fwhm)
}

/// Detection-limit contrast curve of a calibrated, centred image.
///
/// Sector backgrounds of each annulus drive one synthetic injection per
/// sector; the median and scatter of the detectable fluxes give the
/// contrast and its uncertainty relative to the central aperture flux.
/// Undefined bins become NaN and are reported with a warning.
///
/// Fails with [`AoError::InvalidParameter`](crate::error::AoError) when
/// `fwhm` or `plate_scale` is not a positive finite number.
pub fn compute_contrast_curve(
    image: &Array2<f64>,
    fwhm: f64,
    plate_scale: f64,
    center: Option<Center>,
    config: &ContrastConfig,
) -> Result<ContrastCurve> {
    profile::ensure_positive("fwhm", fwhm)?;
    profile::ensure_positive("plate scale", plate_scale)?;
    let rs = radius_size(fwhm, plate_scale);
    let profile = contrast_curve_core(image, plate_scale, fwhm, Some(rs), center, config)?;
    Ok(contrast_curve_from_profile(image, fwhm, center, &profile, config))
}

/// Second half of [`compute_contrast_curve`], given a precomputed profile.
pub fn contrast_curve_from_profile(
    image: &Array2<f64>,
    fwhm: f64,
    center: Option<Center>,
    profile: &BackgroundProfile,
    config: &ContrastConfig,
) -> ContrastCurve {
    let central = run_ap_phot(image, fwhm, center, config);
    info!(
        flux = central.flux,
        error = central.error,
        annuli = profile.len(),
        "central aperture measured"
    );

    let mut points = Vec::with_capacity(profile.len() + 1);
    points.push(to_point(0.0, central.flux, central.error, central.flux));

    for (j, annulus) in profile.annuli.iter().enumerate() {
        let fluxes: Vec<f64> = annulus
            .sectors
            .par_iter()
            .enumerate()
            .map(|(s, stats)| {
                let background = InjectionBackground {
                    level: stats.median,
                    std: stats.std,
                };
                detectable_flux(
                    background,
                    fwhm,
                    config,
                    injection::sector_seed(config.seed, j, s),
                )
            })
            .collect();

        let flux = nan_median(&fluxes);
        let std = nan_std(&fluxes);
        let point = to_point(annulus.separation, flux, std, central.flux);
        if point.delta_mag.is_nan() {
            warn!(
                annulus = j,
                separation = annulus.separation,
                flux,
                "contrast undefined for annulus; recording NaN"
            );
        }
        points.push(point);
    }

    ContrastCurve { points }
}

fn to_point(separation: f64, flux: f64, flux_std: f64, central_flux: f64) -> ContrastPoint {
    let ratio = flux / central_flux;
    let (delta_mag, uncertainty) = if ratio.is_finite() && ratio > 0.0 {
        (
            -2.5 * ratio.log10(),
            2.5 * (1.0 + flux_std / flux).log10(),
        )
    } else {
        (f64::NAN, f64::NAN)
    };
    ContrastPoint {
        separation,
        delta_mag,
        uncertainty,
    }
}
