use std::f64::consts::{FRAC_PI_4, PI};
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::consts::{FWHM_PER_SIGMA, PARALLEL_FRAME_THRESHOLD, PEAK_MEDIAN_FILTER_SIZE};
use crate::error::{AoError, Result};
use crate::frame::{geometric_center, Center, Shift};
use crate::pipeline::config::{PsfFitConfig, RegistrationConfig};
use crate::stats::{median_filter, nan_median, sigma_clipped_stats};

use super::peaks::argmax;
use super::registration::{Registration, RegistrationStrategy};
use super::roll::Window;
use super::sampler::EnsembleSampler;
use super::subpixel::{refine_peak_paraboloid, subpixel_shift};

const N_PARAMS: usize = 6;
const LOG_F_RANGE: (f64, f64) = (-10.0, 1.0);
const MIN_SIGMA: f64 = 0.3;

/// Rotated elliptical Gaussian. `x0`/`y0` are column/row in cutout pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianPsf {
    pub x0: f64,
    pub y0: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    /// Radians, in `[-π/4, π/4)`.
    pub rotation: f64,
    /// Log of the fractional model-scaled noise term.
    pub log_f: f64,
}

impl GaussianPsf {
    fn from_params(p: &[f64]) -> Self {
        Self {
            x0: p[0],
            y0: p[1],
            sigma_x: p[2],
            sigma_y: p[3],
            rotation: p[4],
            log_f: p[5],
        }
    }

    pub fn fwhm(&self) -> f64 {
        FWHM_PER_SIGMA * (self.sigma_x * self.sigma_y).sqrt()
    }

    /// Unit-peak profile at `(row, col)`.
    pub fn profile(&self, row: f64, col: f64) -> f64 {
        elliptical_gaussian(row - self.y0, col - self.x0, self.sigma_x, self.sigma_y, self.rotation)
    }
}

fn elliptical_gaussian(dy: f64, dx: f64, sigma_x: f64, sigma_y: f64, rotation: f64) -> f64 {
    let (sin, cos) = rotation.sin_cos();
    let (sx2, sy2) = (sigma_x * sigma_x, sigma_y * sigma_y);
    let a = cos * cos / (2.0 * sx2) + sin * sin / (2.0 * sy2);
    let b = -(2.0 * rotation).sin() / (4.0 * sx2) + (2.0 * rotation).sin() / (4.0 * sy2);
    let c = sin * sin / (2.0 * sx2) + cos * cos / (2.0 * sy2);
    (-(a * dx * dx + 2.0 * b * dx * dy + c * dy * dy)).exp()
}

/// Cutout being fitted plus the fixed nuisance levels.
struct FitProblem {
    data: Array2<f64>,
    background: f64,
    amplitude: f64,
    noise_var: f64,
}

impl FitProblem {
    fn in_prior(&self, p: &[f64]) -> bool {
        let (h, w) = self.data.dim();
        let max_sigma = h.max(w) as f64 / 2.0;
        (0.0..w as f64).contains(&p[0])
            && (0.0..h as f64).contains(&p[1])
            && p[2] > MIN_SIGMA
            && p[2] < max_sigma
            && p[3] > MIN_SIGMA
            && p[3] < max_sigma
            && (-FRAC_PI_4..FRAC_PI_4).contains(&p[4])
            && p[5] > LOG_F_RANGE.0
            && p[5] < LOG_F_RANGE.1
    }

    /// Gaussian likelihood with variance `noise² + model² · f²` under flat priors.
    fn log_prob(&self, p: &[f64]) -> f64 {
        if !self.in_prior(p) {
            return f64::NEG_INFINITY;
        }
        let psf = GaussianPsf::from_params(p);
        let f2 = (2.0 * psf.log_f).exp();
        let mut total = 0.0;
        for ((r, c), &d) in self.data.indexed_iter() {
            if !d.is_finite() {
                continue;
            }
            let model = self.background + self.amplitude * psf.profile(r as f64, c as f64);
            let s2 = self.noise_var + model * model * f2;
            total += (d - model).powi(2) / s2 + (2.0 * PI * s2).ln();
        }
        -0.5 * total
    }
}

/// Best-fit PSF of one frame, in frame coordinates.
#[derive(Clone, Copy, Debug)]
pub struct PsfFit {
    pub center: Center,
    pub psf: GaussianPsf,
    pub acceptance: f64,
}

/// Set-averaged PSF shape fed to the detector pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PsfShape {
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub sigma_ratio: f64,
    pub rotation: f64,
    pub fwhm: f64,
}

impl Default for PsfShape {
    fn default() -> Self {
        Self {
            sigma_x: 2.0,
            sigma_y: 2.0,
            sigma_ratio: 1.0,
            rotation: 0.0,
            fwhm: 2.0 * FWHM_PER_SIGMA,
        }
    }
}

/// Brightest pixel after a 7×7 median filter, which rejects hot pixels.
pub fn filtered_peak(image: &Array2<f64>) -> Option<Center> {
    let filtered = median_filter(image, PEAK_MEDIAN_FILTER_SIZE);
    argmax(&filtered).map(|(r, c)| Center::new(r as f64, c as f64))
}

/// Fit a rotated Gaussian to the star in `image` with the ensemble sampler.
///
/// `None` when the frame has no finite pixel or the fit never reaches a
/// finite likelihood.
pub fn fit_frame_psf(image: &Array2<f64>, config: &PsfFitConfig, seed: u64) -> Option<PsfFit> {
    let peak = filtered_peak(image)?;
    let half = config.cutout / 2;
    let window = Window::around(peak, half, image.dim());
    // Window::around spans [c - half, c + half); widen by one for odd sides.
    let window = Window {
        rows: (window.rows + 1).min(image.nrows() - window.row0),
        cols: (window.cols + 1).min(image.ncols() - window.col0),
        ..window
    };
    if window.is_empty() {
        return None;
    }
    let data = window.extract(image);

    let finite: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    let background = nan_median(&finite);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let amplitude = max - background;
    if !amplitude.is_finite() || amplitude <= 0.0 {
        return None;
    }
    let noise = sigma_clipped_stats(&finite, 3.0, 5).std;
    let noise_var = if noise.is_finite() && noise > 0.0 {
        noise * noise
    } else {
        1.0
    };

    let problem = FitProblem {
        data,
        background,
        amplitude,
        noise_var,
    };

    let start = [
        peak.col - window.col0 as f64,
        peak.row - window.row0 as f64,
        2.0,
        2.0,
        0.0,
        -3.0,
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let initial = initial_walkers(&problem, &start, config.walkers.max(4), &mut rng)?;

    let chain = EnsembleSampler::new(config.walkers).run(
        |p| problem.log_prob(p),
        initial,
        config.steps,
        config.burn_in.min(config.steps.saturating_sub(1)),
        &mut rng,
    );
    if chain.is_empty() {
        return None;
    }
    let params = chain.median();
    if params.len() != N_PARAMS || params.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let psf = GaussianPsf::from_params(&params);

    Some(PsfFit {
        center: window.to_image(psf.y0, psf.x0),
        psf,
        acceptance: chain.acceptance,
    })
}

fn initial_walkers(
    problem: &FitProblem,
    start: &[f64; N_PARAMS],
    walkers: usize,
    rng: &mut StdRng,
) -> Option<Vec<Vec<f64>>> {
    if !problem.log_prob(start).is_finite() {
        return None;
    }
    let scales = [0.1, 0.1, 0.1, 0.1, 0.05, 0.1];
    let jitter = Normal::new(0.0, 1.0).ok()?;
    let mut positions = Vec::with_capacity(walkers);
    while positions.len() < walkers {
        let mut candidate: Vec<f64> = start.to_vec();
        for _ in 0..100 {
            let trial: Vec<f64> = start
                .iter()
                .zip(scales)
                .map(|(s, k)| s + k * jitter.sample(rng))
                .collect();
            if problem.in_prior(&trial) {
                candidate = trial;
                break;
            }
        }
        positions.push(candidate);
    }
    Some(positions)
}

/// Average shape of a set of fits.
pub fn mean_shape(fits: &[PsfFit]) -> PsfShape {
    if fits.is_empty() {
        return PsfShape::default();
    }
    let n = fits.len() as f64;
    let avg = |f: fn(&PsfFit) -> f64| fits.iter().map(f).sum::<f64>() / n;
    PsfShape {
        sigma_x: avg(|f| f.psf.sigma_x),
        sigma_y: avg(|f| f.psf.sigma_y),
        sigma_ratio: avg(|f| f.psf.sigma_y / f.psf.sigma_x),
        rotation: avg(|f| f.psf.rotation),
        fwhm: avg(|f| f.psf.fwhm()),
    }
}

/// Re-derive a star centre with a detector matched to `shape`.
///
/// Convolves the neighbourhood of `around` with the shape kernel, takes
/// the brightest response and refines it with a paraboloid fit.
pub fn detect_with_shape(image: &Array2<f64>, around: Center, shape: &PsfShape, window: usize) -> Center {
    let (h, w) = image.dim();
    let reach = (3.0 * shape.sigma_x.max(shape.sigma_y)).ceil() as isize;
    let kernel: Vec<(isize, isize, f64)> = (-reach..=reach)
        .flat_map(|dy| (-reach..=reach).map(move |dx| (dy, dx)))
        .map(|(dy, dx)| {
            let k = elliptical_gaussian(dy as f64, dx as f64, shape.sigma_x, shape.sigma_y, shape.rotation);
            (dy, dx, k)
        })
        .collect();

    let region = Window::around(around, window, (h, w));
    if region.is_empty() {
        return around;
    }
    let response = Array2::from_shape_fn((region.rows, region.cols), |(r, c)| {
        let (row, col) = ((region.row0 + r) as isize, (region.col0 + c) as isize);
        kernel
            .iter()
            .filter_map(|&(dy, dx, k)| {
                let (rr, cc) = (row + dy, col + dx);
                if rr < 0 || cc < 0 || rr >= h as isize || cc >= w as isize {
                    return None;
                }
                let v = image[[rr as usize, cc as usize]];
                v.is_finite().then_some(k * v)
            })
            .sum::<f64>()
    });

    match argmax(&response) {
        Some((r, c)) => {
            let (dr, dc) = refine_peak_paraboloid(&response, r, c);
            region.to_image(r as f64 + dr, c as f64 + dc)
        }
        None => around,
    }
}

/// PSF-fit registration of a whole frame set.
///
/// Every frame is fitted independently (frame-parallel above the usual
/// threshold), the fits are averaged into one shape, and each frame is
/// re-centred with the shape-matched detector and shifted so the star lands
/// on its geometric centre. `on_frame_done` receives the running count of
/// fitted frames.
pub fn register_psf_fit<F>(
    frames: &[Array2<f64>],
    config: &RegistrationConfig,
    on_frame_done: F,
) -> Result<(Vec<Registration>, PsfShape)>
where
    F: Fn(usize) + Send + Sync,
{
    if frames.is_empty() {
        return Err(AoError::EmptySequence);
    }

    let counter = AtomicUsize::new(0);
    let fit_one = |(i, frame): (usize, &Array2<f64>)| {
        let fit = fit_frame_psf(frame, &config.psf_fit, config.psf_fit.seed.wrapping_add(i as u64));
        let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
        on_frame_done(done);
        fit
    };
    let fits: Vec<Option<PsfFit>> = if frames.len() >= PARALLEL_FRAME_THRESHOLD {
        frames.par_iter().enumerate().map(fit_one).collect()
    } else {
        frames.iter().enumerate().map(fit_one).collect()
    };

    let good: Vec<PsfFit> = fits.iter().flatten().copied().collect();
    if good.len() < frames.len() {
        warn!(
            failed = frames.len() - good.len(),
            "PSF fit failed for some frames; using filtered peaks there"
        );
    }
    let shape = mean_shape(&good);
    info!(
        fits = good.len(),
        fwhm = shape.fwhm,
        sigma_ratio = shape.sigma_ratio,
        rotation = shape.rotation,
        "PSF shape averaged"
    );

    let registrations = frames
        .iter()
        .zip(&fits)
        .map(|(frame, fit)| {
            let seed = fit
                .map(|f| f.center)
                .or_else(|| filtered_peak(frame))
                .unwrap_or_else(|| geometric_center(frame));
            let star = detect_with_shape(frame, seed, &shape, config.psf_fit.detector_window);
            let shift = Shift::between(star, geometric_center(frame));
            debug!(row = star.row, col = star.col, "PSF-fit centre");
            Registration {
                image: subpixel_shift(frame, shift, config.interpolation),
                shift,
                strategy: RegistrationStrategy::PsfFit,
                residual_map: None,
            }
        })
        .collect();

    Ok((registrations, shape))
}
