//! Camera-specific behaviour behind one capability interface.
//!
//! The reduction core never branches on which camera took the data; it
//! receives an `&dyn Instrument` and calls through it.

use std::path::Path;

use ndarray::Array2;
use tracing::debug;

use crate::align::roll::Window;
use crate::error::{AoError, Result};
use crate::frame::{Center, FrameHeader};
use crate::io::fits::read_fits;
use crate::pipeline::config::InstrumentKind;
use crate::stats::median_filter;

pub trait Instrument: Send + Sync {
    fn name(&self) -> &'static str;

    /// Arcseconds per pixel.
    fn plate_scale(&self) -> f64;

    /// Raw file name prefix, e.g. `s` for `s0042.fits`.
    fn file_prefix(&self) -> &'static str;

    /// Cut a raw detector read-out down to the region the reduction uses.
    fn crop_to_working_region(&self, raw: &Array2<f64>) -> Array2<f64>;

    /// Filter in use, `fallback` when the header does not say.
    fn filter_name(&self, header: &FrameHeader, fallback: &str) -> String;

    /// Exposure time in seconds.
    fn true_integration_time(&self, header: &FrameHeader) -> Result<f64>;

    /// Replace flagged and NaN pixels with a local median.
    fn repair_bad_pixels(&self, image: &Array2<f64>) -> Array2<f64>;

    /// Filter whose master flat calibrates frames taken through `filter`.
    fn flat_filter(&self, filter: &str) -> String {
        filter.to_string()
    }
}

/// Build the instrument named in a reduction config.
pub fn instrument_for(kind: InstrumentKind, bad_pixel_mask: Option<&Path>) -> Result<Box<dyn Instrument>> {
    match kind {
        InstrumentKind::Sharcs => {
            let sharcs = match bad_pixel_mask {
                Some(path) => {
                    let mask = read_fits(path)?
                        .into_iter()
                        .next()
                        .ok_or_else(|| AoError::InvalidFits(format!("{}: empty mask", path.display())))?;
                    Sharcs::with_mask(&mask.data)
                }
                None => Sharcs::new(),
            };
            Ok(Box::new(sharcs))
        }
        InstrumentKind::Pharo => Ok(Box::new(Pharo)),
    }
}

/// ShARCS on the Shane 3 m telescope at Lick Observatory.
#[derive(Clone, Debug, Default)]
pub struct Sharcs {
    /// Bad-pixel flags in working-region coordinates.
    mask: Option<Array2<bool>>,
}

impl Sharcs {
    /// Centre `(row, col)` of the working region on the full detector.
    pub const REGION_CENTER: (usize, usize) = (750, 1100);
    pub const REGION_SIZE: usize = 600;
    pub const PLATE_SCALE: f64 = 0.033;
    const REPAIR_FILTER_SIZE: usize = 7;

    pub fn new() -> Self {
        Self::default()
    }

    /// Use a full-detector mask (1 = bad); it is cropped like the frames.
    pub fn with_mask(full_mask: &Array2<f64>) -> Self {
        let cropped = Self::crop(full_mask);
        Self {
            mask: Some(cropped.mapv(|v| v == 1.0)),
        }
    }

    fn crop(raw: &Array2<f64>) -> Array2<f64> {
        let (row, col) = Self::REGION_CENTER;
        Window::around(
            Center::new(row as f64, col as f64),
            Self::REGION_SIZE / 2,
            raw.dim(),
        )
        .extract(raw)
    }
}

impl Instrument for Sharcs {
    fn name(&self) -> &'static str {
        "ShARCS"
    }

    fn plate_scale(&self) -> f64 {
        Self::PLATE_SCALE
    }

    fn file_prefix(&self) -> &'static str {
        "s"
    }

    fn crop_to_working_region(&self, raw: &Array2<f64>) -> Array2<f64> {
        Self::crop(raw)
    }

    fn filter_name(&self, header: &FrameHeader, fallback: &str) -> String {
        match header.get_str("FILT1NAM").map(str::trim) {
            Some(name) if !name.is_empty() && name != "Unknown" => name.to_string(),
            _ => fallback.to_string(),
        }
    }

    fn true_integration_time(&self, header: &FrameHeader) -> Result<f64> {
        header
            .get_f64("ITIME0")
            .map(|microseconds| microseconds / 1e6)
            .ok_or_else(|| AoError::MissingKeyword("ITIME0".into()))
    }

    fn repair_bad_pixels(&self, image: &Array2<f64>) -> Array2<f64> {
        let filtered = median_filter(image, Self::REPAIR_FILTER_SIZE);
        let mut repaired = image.clone();
        let mut replaced = 0usize;
        for ((r, c), v) in repaired.indexed_iter_mut() {
            let flagged = self
                .mask
                .as_ref()
                .and_then(|m| m.get((r, c)).copied())
                .unwrap_or(false);
            if flagged || v.is_nan() {
                *v = filtered[[r, c]];
                replaced += 1;
            }
        }
        debug!(replaced, "bad pixels repaired");
        repaired
    }
}

/// PHARO on the Hale 200-inch telescope at Palomar.
#[derive(Clone, Copy, Debug, Default)]
pub struct Pharo;

impl Pharo {
    pub const PLATE_SCALE: f64 = 0.025;
    const REPAIR_FILTER_SIZE: usize = 10;
    const REPAIR_PASSES: usize = 3;
}

impl Instrument for Pharo {
    fn name(&self) -> &'static str {
        "PHARO"
    }

    fn plate_scale(&self) -> f64 {
        Self::PLATE_SCALE
    }

    fn file_prefix(&self) -> &'static str {
        "sph"
    }

    fn crop_to_working_region(&self, raw: &Array2<f64>) -> Array2<f64> {
        raw.clone()
    }

    fn filter_name(&self, header: &FrameHeader, fallback: &str) -> String {
        match header.get_str("FILTER").map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => fallback.to_string(),
        }
    }

    fn true_integration_time(&self, header: &FrameHeader) -> Result<f64> {
        header
            .get_f64("T_INT")
            .map(|ms| ms / 1000.0)
            .ok_or_else(|| AoError::MissingKeyword("T_INT".into()))
    }

    fn repair_bad_pixels(&self, image: &Array2<f64>) -> Array2<f64> {
        let mut repaired = image.clone();
        for _ in 0..Self::REPAIR_PASSES {
            if !repaired.iter().any(|v| v.is_nan()) {
                break;
            }
            let filtered = median_filter(&repaired, Self::REPAIR_FILTER_SIZE);
            repaired.zip_mut_with(&filtered, |v, &f| {
                if v.is_nan() {
                    *v = f;
                }
            });
        }
        repaired
    }

    // No Br-gamma flats are taken at Palomar.
    fn flat_filter(&self, filter: &str) -> String {
        if filter == "Br-gamma" {
            "K_short".to_string()
        } else {
            filter.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HeaderValue;

    #[test]
    fn test_sharcs_crop_region() {
        let raw = Array2::from_shape_fn((2048, 2048), |(r, c)| (r * 10_000 + c) as f64);
        let cropped = Sharcs::new().crop_to_working_region(&raw);
        assert_eq!(cropped.dim(), (600, 600));
        assert_eq!(cropped[[0, 0]], (450 * 10_000 + 800) as f64);
    }

    #[test]
    fn test_filter_fallback() {
        let mut header = FrameHeader::new();
        header.set("FILT1NAM", HeaderValue::Str("Unknown".into()));
        assert_eq!(Sharcs::new().filter_name(&header, "Ks"), "Ks");
        header.set("FILT1NAM", HeaderValue::Str("J".into()));
        assert_eq!(Sharcs::new().filter_name(&header, "Ks"), "J");
    }

    #[test]
    fn test_integration_time_units() {
        let mut header = FrameHeader::new();
        header.set("ITIME0", HeaderValue::Int(1_500_000));
        header.set("T_INT", HeaderValue::Float(2500.0));
        assert_eq!(Sharcs::new().true_integration_time(&header).unwrap(), 1.5);
        assert_eq!(Pharo.true_integration_time(&header).unwrap(), 2.5);
        assert!(Pharo.true_integration_time(&FrameHeader::new()).is_err());
    }

    #[test]
    fn test_pharo_fills_nan() {
        let mut image = Array2::from_elem((20, 20), 4.0);
        image[[10, 10]] = f64::NAN;
        let repaired = Pharo.repair_bad_pixels(&image);
        assert_eq!(repaired[[10, 10]], 4.0);
    }
}
