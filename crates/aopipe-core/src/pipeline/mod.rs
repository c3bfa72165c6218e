pub mod config;
mod orchestrator;
mod types;

pub use config::{
    AnalysisConfig, ContrastConfig, InstrumentKind, PreviewConfig, PsfFitConfig, ReductionConfig,
    RegistrationConfig, ShiftInterpolation, StackConfig,
};
pub use orchestrator::{reduce_night, reduce_night_reported, reduce_target};
pub use types::{NightSummary, NoOpReporter, PipelineStage, ProgressReporter, TargetReduction};
