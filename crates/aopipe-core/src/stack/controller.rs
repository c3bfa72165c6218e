use ndarray::Array2;
use tracing::info;

use crate::align::{
    crop_center, register_frames_with_progress, Registration, RegistrationStrategy,
};
use crate::error::Result;
use crate::frame::{Center, Shift};
use crate::pipeline::config::{RegistrationConfig, StackConfig};

use super::median::nan_median_stack;

/// Per-frame registration record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameShift {
    /// Position of the frame in the input set.
    pub index: usize,
    pub shift: Shift,
    pub strategy: RegistrationStrategy,
}

/// Combined image of one target/filter plus its registration records.
#[derive(Clone, Debug)]
pub struct StackResult {
    pub image: Array2<f64>,
    pub shifts: Vec<FrameShift>,
    /// Residual maps of frames that went through the saturated strategy.
    pub residual_maps: Vec<(usize, Array2<f64>)>,
}

impl StackResult {
    /// Number of frames that needed the saturated fallback.
    pub fn fallbacks(&self, requested: RegistrationStrategy) -> usize {
        self.shifts.iter().filter(|s| s.strategy != requested).count()
    }
}

/// Register every frame, median-combine the aligned frames (NaN-aware) and
/// crop the centre to `stack.final_size`.
///
/// A frame whose registration falls back still contributes to the stack.
pub fn stack_frames<F>(
    frames: &[Array2<f64>],
    strategy: RegistrationStrategy,
    rough_center: Option<Center>,
    registration: &RegistrationConfig,
    stack: &StackConfig,
    on_frame_done: F,
) -> Result<StackResult>
where
    F: Fn(usize) + Send + Sync,
{
    let registrations =
        register_frames_with_progress(frames, strategy, rough_center, registration, on_frame_done)?;

    let mut shifts = Vec::with_capacity(registrations.len());
    let mut residual_maps = Vec::new();
    let mut aligned = Vec::with_capacity(registrations.len());
    for (index, reg) in registrations.into_iter().enumerate() {
        let Registration {
            image,
            shift,
            strategy: used,
            residual_map,
        } = reg;
        shifts.push(FrameShift {
            index,
            shift,
            strategy: used,
        });
        if let Some(map) = residual_map {
            residual_maps.push((index, map));
        }
        aligned.push(image);
    }

    let combined = nan_median_stack(&aligned)?;
    drop(aligned);
    let image = match stack.final_size {
        Some(size) => crop_center(&combined, size),
        None => combined,
    };

    let result = StackResult {
        image,
        shifts,
        residual_maps,
    };
    info!(
        frames = frames.len(),
        strategy = %strategy,
        fallbacks = result.fallbacks(strategy),
        rows = result.image.nrows(),
        cols = result.image.ncols(),
        "frames stacked"
    );
    Ok(result)
}
