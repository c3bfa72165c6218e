pub mod bruteforce;
mod dispatcher;
pub mod peaks;
pub mod psf_fit;
pub mod registration;
pub mod roll;
pub mod sampler;
pub mod saturated;
pub mod subpixel;

pub use bruteforce::register_bruteforce;
pub use dispatcher::{register_frame, register_frames_with_progress};
pub use peaks::PeakSearch;
pub use psf_fit::{register_psf_fit, PsfShape};
pub use registration::{Registration, RegistrationStrategy};
pub use roll::{crop_center, roll_shift};
pub use saturated::register_saturated;
pub use subpixel::subpixel_shift;
