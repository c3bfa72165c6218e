use std::path::PathBuf;

use crate::contrast::ContrastCurve;
use crate::io::ObservationMethod;

/// Night-reduction stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    ReadingLog,
    Darks,
    Flats,
    Skies,
    Calibration,
    Registration,
    Contrast,
    Writing,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadingLog => write!(f, "Reading observation log"),
            Self::Darks => write!(f, "Building master darks"),
            Self::Flats => write!(f, "Building master flats"),
            Self::Skies => write!(f, "Building master skies"),
            Self::Calibration => write!(f, "Calibrating science frames"),
            Self::Registration => write!(f, "Registering and stacking"),
            Self::Contrast => write!(f, "Computing contrast curve"),
            Self::Writing => write!(f, "Writing products"),
        }
    }
}

/// Thread-safe progress reporting for the reduction.
///
/// Implementors can use this to drive progress bars or logging. All
/// methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g., frame count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// `items_done` work items of the current stage have completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Reporter that ignores every event.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Products of one target observed through one filter.
#[derive(Clone, Debug)]
pub struct TargetReduction {
    pub target: String,
    pub filter: String,
    pub method: ObservationMethod,
    pub frames: usize,
    /// Frames whose registration fell back to the saturated strategy.
    pub fallbacks: usize,
    pub fwhm: f64,
    pub output_dir: PathBuf,
    pub contrast: Option<ContrastCurve>,
}

/// Everything a night's reduction produced.
#[derive(Clone, Debug, Default)]
pub struct NightSummary {
    pub darks: Vec<PathBuf>,
    pub flats: Vec<PathBuf>,
    pub skies: Vec<PathBuf>,
    pub targets: Vec<TargetReduction>,
}
