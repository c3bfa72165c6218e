use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::frame::Center;

/// Configuration of one night's reduction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReductionConfig {
    /// Directory holding the raw `<prefix><NNNN>.fits` frames.
    pub raw_dir: PathBuf,
    /// Output root. Calibration products and per-target folders go here.
    pub reduced_dir: PathBuf,
    /// Observation log CSV.
    pub obs_log: PathBuf,
    #[serde(default)]
    pub instrument: InstrumentKind,
    /// Optional bad-pixel mask (FITS, 1 = bad) for instruments that use one.
    #[serde(default)]
    pub bad_pixel_mask: Option<PathBuf>,
    /// Rough stellar positions for wide-binary targets, keyed by target name.
    #[serde(default)]
    pub rough_centers: BTreeMap<String, Center>,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub stacking: StackConfig,
    #[serde(default)]
    pub contrast: ContrastConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

impl ReductionConfig {
    pub fn new(raw_dir: PathBuf, reduced_dir: PathBuf, obs_log: PathBuf) -> Self {
        Self {
            raw_dir,
            reduced_dir,
            obs_log,
            instrument: InstrumentKind::default(),
            bad_pixel_mask: None,
            rough_centers: BTreeMap::new(),
            registration: RegistrationConfig::default(),
            stacking: StackConfig::default(),
            contrast: ContrastConfig::default(),
            preview: PreviewConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    #[default]
    Sharcs,
    Pharo,
}

impl std::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sharcs => write!(f, "ShARCS"),
            Self::Pharo => write!(f, "PHARO"),
        }
    }
}

/// Interpolation used for sub-pixel translations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftInterpolation {
    Bilinear,
    #[default]
    Bicubic,
    /// Shift theorem in the Fourier domain.
    Fourier,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Half-width of the integer shift grid for the rotational search.
    pub search_radius: usize,
    /// Minimum spacing of local maxima in the peak search.
    pub peak_min_distance: usize,
    /// Side of the rotational-search working window.
    pub saturated_window: usize,
    /// Residual surface upsampling factor.
    pub upsample: usize,
    pub interpolation: ShiftInterpolation,
    pub psf_fit: PsfFitConfig,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            search_radius: DEFAULT_SEARCH_RADIUS,
            peak_min_distance: DEFAULT_PEAK_MIN_DISTANCE,
            saturated_window: SATURATED_WINDOW_SIZE,
            upsample: RESIDUAL_UPSAMPLE,
            interpolation: ShiftInterpolation::default(),
            psf_fit: PsfFitConfig::default(),
        }
    }
}

/// Ensemble-sampler settings for the PSF-fit strategy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PsfFitConfig {
    pub walkers: usize,
    pub steps: usize,
    pub burn_in: usize,
    /// Side of the square cutout fitted around the brightest pixel.
    pub cutout: usize,
    /// Half-width of the window searched by the shape-matched detector.
    pub detector_window: usize,
    pub seed: u64,
}

impl Default for PsfFitConfig {
    fn default() -> Self {
        Self {
            walkers: 32,
            steps: 400,
            burn_in: 150,
            cutout: 31,
            detector_window: 25,
            seed: 0x5eed,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Side of the central region kept after combination; `None` keeps the
    /// full frame.
    pub final_size: Option<usize>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            final_size: Some(DEFAULT_FINAL_SIZE),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastConfig {
    pub enabled: bool,
    pub sector_count: usize,
    pub clip_sigma: f64,
    pub converge_fraction: f64,
    pub max_separation_arcsec: f64,
    pub sky_inner_fwhm: f64,
    pub sky_width: f64,
    pub injection_canvas: usize,
    pub injection_peak_sigma: f64,
    pub injection_offset: f64,
    pub target_snr: f64,
    pub photons_per_adu: f64,
    /// Base seed for the injection noise.
    pub seed: u64,
}

impl Default for ContrastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sector_count: SECTOR_COUNT,
            clip_sigma: DEFAULT_CLIP_SIGMA,
            converge_fraction: DEFAULT_CONVERGE_FRACTION,
            max_separation_arcsec: MAX_SEPARATION_ARCSEC,
            sky_inner_fwhm: SKY_INNER_FWHM_MULTIPLE,
            sky_width: SKY_ANNULUS_WIDTH,
            injection_canvas: DEFAULT_INJECTION_CANVAS,
            injection_peak_sigma: INJECTION_PEAK_SIGMA,
            injection_offset: INJECTION_OFFSET,
            target_snr: TARGET_SNR,
            photons_per_adu: PHOTONS_PER_ADU,
            seed: 42,
        }
    }
}

/// Iterative source detection and centre/FWHM refinement of a reduced image.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Background clipping sigma.
    pub detect_sigma: f64,
    /// Threshold in clipped standard deviations above the median.
    pub threshold_scale: f64,
    pub initial_fwhm: f64,
    pub max_search_fwhm: f64,
    pub max_iterations: usize,
    pub position_tolerance: f64,
    pub fwhm_tolerance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            detect_sigma: DETECT_CLIP_SIGMA,
            threshold_scale: DETECT_THRESHOLD_SCALE,
            initial_fwhm: DETECT_INITIAL_FWHM,
            max_search_fwhm: DETECT_MAX_FWHM,
            max_iterations: ANALYSIS_MAX_ITERATIONS,
            position_tolerance: ANALYSIS_POSITION_TOLERANCE,
            fwhm_tolerance: ANALYSIS_FWHM_TOLERANCE,
        }
    }
}

/// PNG previews of residual maps and final stacks.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub enabled: bool,
    /// Lower display limit; defaults to the image minimum.
    pub vmin: Option<f64>,
    /// Upper display limit; defaults to the image maximum.
    pub vmax: Option<f64>,
}
