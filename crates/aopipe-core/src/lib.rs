pub mod align;
pub mod analysis;
pub mod calib;
pub mod consts;
pub mod contrast;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod instrument;
pub mod io;
pub mod pipeline;
pub mod stack;
pub mod stats;
pub mod summary;
