/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum frame count to use frame-level Rayon parallelism.
pub const PARALLEL_FRAME_THRESHOLD: usize = 4;

/// Conversion between Gaussian sigma and full width at half maximum.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949;

/// Default half-width of the integer search grid for saturated registration.
pub const DEFAULT_SEARCH_RADIUS: usize = 10;

/// Side of the square working window cut for the rotational residual search.
pub const SATURATED_WINDOW_SIZE: usize = 200;

/// Upsampling factor applied to the residual surface before the argmin
/// (0.01 px lattice).
pub const RESIDUAL_UPSAMPLE: usize = 100;

/// Minimum separation (pixels) between local maxima in the peak search.
pub const DEFAULT_PEAK_MIN_DISTANCE: usize = 100;

/// The threshold search accepts between one and this many peaks.
pub const MAX_ACCEPTED_PEAKS: usize = 3;

/// A rough-center sub-window has half-width `rows / ROUGH_WINDOW_DIVISOR`
/// (side about rows/25).
pub const ROUGH_WINDOW_DIVISOR: usize = 50;

/// Side of the central region kept from the combined stack.
pub const DEFAULT_FINAL_SIZE: usize = 600;

/// Median-filter footprint used to locate the brightest pixel before
/// integer pre-centering.
pub const PEAK_MEDIAN_FILTER_SIZE: usize = 7;

/// Number of angular sectors per annulus (30 degrees each).
pub const SECTOR_COUNT: usize = 12;

/// Contrast curves stop once an annulus starts beyond this separation.
pub const MAX_SEPARATION_ARCSEC: f64 = 10.0;

/// Sigma multiple used when clipping sector backgrounds.
pub const DEFAULT_CLIP_SIGMA: f64 = 3.0;

/// Fractional retained-count change at which sector clipping stops.
pub const DEFAULT_CONVERGE_FRACTION: f64 = 0.2;

/// Maximum iterations for `sigma_clipped_stats`.
pub const SIGMA_CLIP_MAX_ITERS: usize = 5;

/// Sky annulus inner radius, in units of the FWHM.
pub const SKY_INNER_FWHM_MULTIPLE: f64 = 3.0;

/// Sky annulus width beyond the inner radius, in pixels.
pub const SKY_ANNULUS_WIDTH: f64 = 15.0;

/// Side of the synthetic injection canvas.
pub const DEFAULT_INJECTION_CANVAS: usize = 2000;

/// Injected source peak, in units of the sector background sigma.
pub const INJECTION_PEAK_SIGMA: f64 = 7.0;

/// Constant offset added to every injection canvas (counts).
pub const INJECTION_OFFSET: f64 = 3.0;

/// Signal-to-noise ratio the injected flux is rescaled to.
pub const TARGET_SNR: f64 = 5.0;

/// Photons per ADU used in the photometric error budget.
pub const PHOTONS_PER_ADU: f64 = 1.0;

/// Lower bound applied to FWHM estimates.
pub const MIN_FWHM: f64 = 2.0;

/// Sigma used to clip the background before source detection.
pub const DETECT_CLIP_SIGMA: f64 = 5.0;

/// Detection threshold, in units of the clipped background sigma.
pub const DETECT_THRESHOLD_SCALE: f64 = 10.0;

/// Kernel FWHM (pixels) for the first source search of an analysis.
pub const DETECT_INITIAL_FWHM: f64 = 5.0;

/// The detection kernel grows by one pixel per empty search up to this FWHM.
pub const DETECT_MAX_FWHM: f64 = 200.0;

/// Iteration cap for the centre/FWHM refinement.
pub const ANALYSIS_MAX_ITERATIONS: usize = 10;

/// Centre change (pixels) below which the refinement has converged.
pub const ANALYSIS_POSITION_TOLERANCE: f64 = 1.0;

/// FWHM change (pixels) below which the refinement has converged.
pub const ANALYSIS_FWHM_TOLERANCE: f64 = 0.5;

/// Side of the central cutout shown per target in the night image grid.
pub const SUMMARY_CUTOUT_SIZE: usize = 50;
