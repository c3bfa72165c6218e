use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::frame::Center;
use crate::pipeline::config::ContrastConfig;

use super::photometry::run_ap_phot;

/// Background level a synthetic source is injected into.
#[derive(Clone, Copy, Debug)]
pub struct InjectionBackground {
    pub level: f64,
    pub std: f64,
}

/// Deterministic per-(annulus, sector) seed derived from a base seed.
pub fn sector_seed(base: u64, annulus: usize, sector: usize) -> u64 {
    let mut z = base
        ^ (annulus as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (sector as u64 + 1).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Render the part of the injection canvas that photometry can see.
///
/// The full canvas is `config.injection_canvas` pixels square with the source
/// at `canvas / 2`. Only the square reaching the outer sky radius is built,
/// clipped to the canvas. Pixels are `peak * exp(-d² / (2 fwhm²))` plus
/// Gaussian noise at the background level plus the constant offset. A zero
/// or non-finite `std` adds no noise.
pub fn render_injection(
    background: InjectionBackground,
    fwhm: f64,
    config: &ContrastConfig,
    rng: &mut StdRng,
) -> (Array2<f64>, Center) {
    let canvas = config.injection_canvas.max(1);
    let source = (canvas / 2) as isize;
    let reach = (fwhm * config.sky_inner_fwhm + config.sky_width).ceil() as isize + 2;
    let lo = (source - reach).max(0);
    let hi = (source + reach).min(canvas as isize - 1);
    let side = (hi - lo + 1) as usize;

    let peak = config.injection_peak_sigma * background.std;
    let noise = if background.std.is_finite() && background.std > 0.0 {
        Normal::new(background.level, background.std).ok()
    } else {
        None
    };

    let sigma2 = 2.0 * fwhm * fwhm;
    let mut cutout = Array2::<f64>::zeros((side, side));
    for ((r, c), px) in cutout.indexed_iter_mut() {
        let dr = (lo + r as isize - source) as f64;
        let dc = (lo + c as isize - source) as f64;
        let profile = peak * (-(dr * dr + dc * dc) / sigma2).exp();
        let bg = match &noise {
            Some(normal) => normal.sample(rng),
            None => background.level,
        };
        *px = profile + bg + config.injection_offset;
    }

    let local = (source - lo) as f64;
    (cutout, Center::new(local, local))
}

/// Flux of the injected source rescaled to the target signal-to-noise.
///
/// With `k = (flux / err) / target_snr` the detectable flux is `flux / k`.
/// NaN when the photometry is degenerate.
pub fn detectable_flux(
    background: InjectionBackground,
    fwhm: f64,
    config: &ContrastConfig,
    seed: u64,
) -> f64 {
    let mut rng = StdRng::seed_from_u64(seed);
    let (fake, center) = render_injection(background, fwhm, config, &mut rng);
    let phot = run_ap_phot(&fake, fwhm, Some(center), config);
    let scale = (phot.flux / phot.error) / config.target_snr;
    phot.flux / scale
}
