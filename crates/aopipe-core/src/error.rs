use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Unsupported file type (expected FITS): {}", .0.display())]
    UnsupportedFileType(PathBuf),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Missing {kind} calibration product: {}", path.display())]
    MissingCalibration { kind: &'static str, path: PathBuf },

    #[error("Missing header keyword: {0}")]
    MissingKeyword(String),

    #[error("Dimension mismatch: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    DimensionMismatch {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Empty frame sequence")]
    EmptySequence,

    #[error("Observation log error: {0}")]
    ObsLog(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("No rough center supplied for wide-binary target {0}")]
    MissingRoughCenter(String),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Invalid {name}: {value} (must be positive and finite)")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("No sources detected (kernel FWHM searched up to {max_fwhm} px)")]
    NoSourcesDetected { max_fwhm: f64 },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AoError>;
