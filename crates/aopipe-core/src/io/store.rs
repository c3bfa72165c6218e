use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::debug;

use crate::error::{AoError, Result};
use crate::frame::{Frame, FrameHeader};

use super::fits::{read_fits, read_fits_header, write_fits, write_fits_cube};

/// Source of raw frames and sink for reduced products.
///
/// Raw frames are addressed by their running file number; products by path.
pub trait FrameStore: Send + Sync {
    /// Read the frames with the given numbers, preserving order. A file
    /// holding a cube contributes one frame per plane.
    fn read_frames(&self, numbers: &[u32]) -> Result<Vec<Frame>>;

    fn read_header(&self, number: u32) -> Result<FrameHeader>;

    /// Read a previously written product (master dark, flat, sky...).
    fn read_image(&self, path: &Path) -> Result<Frame>;

    /// Persist a 2-D image, replacing any existing file.
    fn write_image(&self, frame: &Frame, path: &Path) -> Result<()>;

    /// Persist a stack of diagnostic planes as one cube.
    fn write_cube(&self, planes: &[Array2<f64>], header: &FrameHeader, path: &Path) -> Result<()>;
}

/// FITS files on disk, raw frames named `<prefix><NNNN>.fits`.
#[derive(Clone, Debug)]
pub struct FitsStore {
    raw_dir: PathBuf,
    prefix: String,
}

impl FitsStore {
    pub fn new(raw_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    /// Path of raw frame `number`, zero-padded to four digits.
    pub fn frame_path(&self, number: u32) -> PathBuf {
        self.raw_dir.join(format!("{}{:04}.fits", self.prefix, number))
    }
}

/// Reject paths that do not carry a `.fits` extension.
pub fn ensure_fits_path(path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("fits") || ext.eq_ignore_ascii_case("fit") => Ok(()),
        _ => Err(AoError::UnsupportedFileType(path.to_path_buf())),
    }
}

impl FrameStore for FitsStore {
    fn read_frames(&self, numbers: &[u32]) -> Result<Vec<Frame>> {
        let mut frames = Vec::with_capacity(numbers.len());
        for &number in numbers {
            let path = self.frame_path(number);
            let planes = read_fits(&path)?;
            debug!(path = %path.display(), planes = planes.len(), "read raw frame");
            frames.extend(planes);
        }
        Ok(frames)
    }

    fn read_header(&self, number: u32) -> Result<FrameHeader> {
        read_fits_header(&self.frame_path(number))
    }

    fn read_image(&self, path: &Path) -> Result<Frame> {
        ensure_fits_path(path)?;
        read_fits(path)?
            .into_iter()
            .next()
            .ok_or_else(|| AoError::InvalidFits(format!("{}: no image data", path.display())))
    }

    fn write_image(&self, frame: &Frame, path: &Path) -> Result<()> {
        ensure_fits_path(path)?;
        create_parent(path)?;
        write_fits(path, &frame.data, &frame.header)
    }

    fn write_cube(&self, planes: &[Array2<f64>], header: &FrameHeader, path: &Path) -> Result<()> {
        ensure_fits_path(path)?;
        create_parent(path)?;
        write_fits_cube(path, planes, header)
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
