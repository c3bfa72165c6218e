pub mod aperture;

pub use aperture::{circle_rect_overlap, CircularAnnulus, CircularAperture};
