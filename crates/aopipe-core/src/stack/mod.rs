pub mod controller;
pub mod median;

pub use controller::{stack_frames, FrameShift, StackResult};
pub use median::nan_median_stack;
