pub mod fits;
pub mod obslog;
pub mod preview;
pub mod store;

pub use fits::{read_fits, read_fits_header, write_fits, write_fits_cube};
pub use obslog::{parse_filenums, LogEntry, ObsLog, ObservationMethod};
pub use preview::save_preview;
pub use store::{ensure_fits_path, FitsStore, FrameStore};
