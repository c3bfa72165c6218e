use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{AoError, Result};
use crate::frame::Center;
use crate::geometry::CircularAperture;
use crate::pipeline::config::ContrastConfig;
use crate::stats::sector::{sector_stats, AnnularSector, SectorStats};
use crate::stats::weighted_std;

/// One radial bin of the background profile.
#[derive(Clone, Debug)]
pub struct AnnulusStats {
    pub r_in: f64,
    pub r_out: f64,
    /// Midpoint radius converted to arcseconds.
    pub separation: f64,
    /// One entry per angular sector, in increasing angle.
    pub sectors: Vec<SectorStats>,
}

impl AnnulusStats {
    pub fn medians(&self) -> Vec<f64> {
        self.sectors.iter().map(|s| s.median).collect()
    }

    pub fn stds(&self) -> Vec<f64> {
        self.sectors.iter().map(|s| s.std).collect()
    }
}

/// Radial/angular background statistics around a star.
#[derive(Clone, Debug)]
pub struct BackgroundProfile {
    pub center: Center,
    pub radius_size: f64,
    /// Weighted scatter inside the central `radius_size` aperture.
    pub core_std: f64,
    pub annuli: Vec<AnnulusStats>,
}

impl BackgroundProfile {
    pub fn separations(&self) -> Vec<f64> {
        self.annuli.iter().map(|a| a.separation).collect()
    }

    pub fn len(&self) -> usize {
        self.annuli.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annuli.is_empty()
    }
}

/// Default profile centre: the midpoint of the index grid.
pub fn profile_center(data: &Array2<f64>) -> Center {
    let (h, w) = data.dim();
    Center::new(
        h.saturating_sub(1) as f64 / 2.0,
        w.saturating_sub(1) as f64 / 2.0,
    )
}

/// Reject a non-positive or non-finite length parameter.
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AoError::InvalidParameter { name, value })
    }
}

/// Partition `data` into annuli of width `radius_size` (default `fwhm`)
/// starting `fwhm` pixels from `center`, split each into angular sectors
/// and measure sector backgrounds.
///
/// Annulus `j` spans `[j * radius_size + fwhm, (j + 1) * radius_size + fwhm)`.
/// The loop ends when the inner edge passes the separation limit or the
/// annulus index reaches `max_radius / radius_size`, where `max_radius`
/// is the largest integer pixel radius in the frame.
///
/// `fwhm`, `radius_size` and `plate_scale` must be positive.
pub fn contrast_curve_core(
    data: &Array2<f64>,
    plate_scale: f64,
    fwhm: f64,
    radius_size: Option<f64>,
    center: Option<Center>,
    config: &ContrastConfig,
) -> Result<BackgroundProfile> {
    ensure_positive("fwhm", fwhm)?;
    ensure_positive("plate scale", plate_scale)?;
    let radius_size = radius_size.unwrap_or(fwhm);
    ensure_positive("radius size", radius_size)?;

    let (h, w) = data.dim();
    let center = center.unwrap_or_else(|| profile_center(data));
    let sectors = config.sector_count.max(1);

    let core = CircularAperture::new(center, radius_size);
    let (core_values, core_weights) = core.weighted_cutout(data);
    let core_std = weighted_std(&core_values, &core_weights).unwrap_or(f64::NAN);

    let max_radius = farthest_corner(h, w, center) as usize;
    let number_of_annuli = (max_radius as f64 / radius_size) as usize;

    let mut bins: Vec<(f64, f64)> = Vec::with_capacity(number_of_annuli.min(max_radius + 1));
    for j in 0..number_of_annuli {
        let r_in = j as f64 * radius_size + fwhm;
        if r_in * plate_scale > config.max_separation_arcsec {
            break;
        }
        bins.push((r_in, r_in + radius_size));
    }

    let annuli: Vec<AnnulusStats> = bins
        .par_iter()
        .map(|&(r_in, r_out)| AnnulusStats {
            r_in,
            r_out,
            separation: (r_in + r_out) / 2.0 * plate_scale,
            sectors: (0..sectors)
                .map(|s| {
                    sector_stats(
                        data,
                        center,
                        AnnularSector::of_annulus(r_in, r_out, s, sectors),
                        config.clip_sigma,
                        config.converge_fraction,
                    )
                })
                .collect(),
        })
        .collect();

    debug!(
        annuli = annuli.len(),
        radius_size, fwhm, "background profile computed"
    );

    Ok(BackgroundProfile {
        center,
        radius_size,
        core_std,
        annuli,
    })
}

/// Distance from `center` to the farthest pixel centre of an `h` x `w` grid.
fn farthest_corner(h: usize, w: usize, center: Center) -> f64 {
    if h == 0 || w == 0 {
        return 0.0;
    }
    let rows = [0.0, (h - 1) as f64];
    let cols = [0.0, (w - 1) as f64];
    rows.iter()
        .flat_map(|&r| cols.iter().map(move |&c| (r, c)))
        .map(|(r, c)| ((r - center.row).powi(2) + (c - center.col).powi(2)).sqrt())
        .fold(0.0, f64::max)
}
