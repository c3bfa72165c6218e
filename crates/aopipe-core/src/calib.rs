//! Master calibration products and science-frame calibration.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::{debug, info};

use crate::align::psf_fit::filtered_peak;
use crate::align::roll_shift;
use crate::error::{AoError, Result};
use crate::frame::{geometric_center, Frame, FrameHeader, HeaderValue, Shift};
use crate::instrument::Instrument;
use crate::io::store::FrameStore;
use crate::stack::nan_median_stack;
use crate::stats::nan_median;

pub fn dark_path(reduced_dir: &Path, integration_time: f64) -> PathBuf {
    reduced_dir.join(format!("dark_{}sec.fits", integration_time.round() as i64))
}

pub fn flat_path(reduced_dir: &Path, filter: &str) -> PathBuf {
    reduced_dir.join(format!("flat_{filter}.fits"))
}

pub fn sky_path(reduced_dir: &Path, target: &str, filter: &str) -> PathBuf {
    reduced_dir.join(target).join(filter).join("sky.fits")
}

/// `DATAFILE` header value listing the frames a product was built from.
fn datafile_value(numbers: &[u32]) -> HeaderValue {
    let list: Vec<String> = numbers.iter().map(u32::to_string).collect();
    HeaderValue::Str(format!("[{}]", list.join(", ")))
}

/// Open a calibration product, failing with a typed error if it is absent.
pub fn load_product(store: &dyn FrameStore, path: &Path, kind: &'static str) -> Result<Frame> {
    match store.read_image(path) {
        Err(AoError::FileNotFound(_)) => Err(AoError::MissingCalibration {
            kind,
            path: path.to_path_buf(),
        }),
        other => other,
    }
}

fn ensure_same_shape(expected: &Array2<f64>, actual: &Array2<f64>) -> Result<()> {
    if expected.dim() != actual.dim() {
        return Err(AoError::DimensionMismatch {
            expected_rows: expected.nrows(),
            expected_cols: expected.ncols(),
            rows: actual.nrows(),
            cols: actual.ncols(),
        });
    }
    Ok(())
}

fn image_median(image: &Array2<f64>) -> f64 {
    nan_median(&image.iter().copied().collect::<Vec<_>>())
}

/// Read raw frames and cut each to the instrument's working region.
pub fn read_working_frames(
    store: &dyn FrameStore,
    instrument: &dyn Instrument,
    numbers: &[u32],
) -> Result<(Vec<Array2<f64>>, FrameHeader)> {
    let first = *numbers.first().ok_or(AoError::EmptySequence)?;
    let header = store.read_header(first)?;
    let frames = store
        .read_frames(numbers)?
        .into_iter()
        .map(|frame| instrument.crop_to_working_region(&frame.data))
        .collect();
    Ok((frames, header))
}

/// Median-combine dark frames into `dark_<t>sec.fits`.
pub fn make_master_dark(
    store: &dyn FrameStore,
    instrument: &dyn Instrument,
    numbers: &[u32],
    reduced_dir: &Path,
) -> Result<(Frame, PathBuf)> {
    let (frames, mut header) = read_working_frames(store, instrument, numbers)?;
    let itime = instrument.true_integration_time(&header)?;
    let dark = nan_median_stack(&frames)?;

    header.set("DATAFILE", datafile_value(numbers));
    let path = dark_path(reduced_dir, itime);
    let frame = Frame::with_header(dark, header);
    store.write_image(&frame, &path)?;
    info!(frames = numbers.len(), itime, path = %path.display(), "master dark written");
    Ok((frame, path))
}

/// Build `flat_<filter>.fits` from flat frames and the dark matching
/// their exposure time.
///
/// Each frame is dark-subtracted and normalised by its own median; the
/// median of those is normalised again.
pub fn make_master_flat(
    store: &dyn FrameStore,
    instrument: &dyn Instrument,
    numbers: &[u32],
    exp_time: f64,
    filter_fallback: &str,
    reduced_dir: &Path,
) -> Result<(Frame, PathBuf)> {
    let dark = load_product(store, &dark_path(reduced_dir, exp_time), "dark")?;
    let (frames, mut header) = read_working_frames(store, instrument, numbers)?;
    let filter = instrument.filter_name(&header, filter_fallback);

    let mut normalized = Vec::with_capacity(frames.len());
    for frame in frames {
        ensure_same_shape(&dark.data, &frame)?;
        let subtracted = frame - &dark.data;
        let level = image_median(&subtracted);
        normalized.push(subtracted / level);
    }

    let combined = nan_median_stack(&normalized)?;
    let level = image_median(&combined);
    let flat = combined / level;

    header.set("DATAFILE", datafile_value(numbers));
    let path = flat_path(reduced_dir, &filter);
    let frame = Frame::with_header(flat, header);
    store.write_image(&frame, &path)?;
    info!(frames = numbers.len(), filter = %filter, path = %path.display(), "master flat written");
    Ok((frame, path))
}

/// Build `<target>/<filter>/sky.fits`: median of flat-fielded sky frames.
pub fn make_master_sky(
    store: &dyn FrameStore,
    instrument: &dyn Instrument,
    numbers: &[u32],
    target: &str,
    filter_fallback: &str,
    reduced_dir: &Path,
) -> Result<(Frame, PathBuf)> {
    let (frames, mut header) = read_working_frames(store, instrument, numbers)?;
    let filter = instrument.filter_name(&header, filter_fallback);
    let flat = load_product(store, &flat_path(reduced_dir, &instrument.flat_filter(&filter)), "flat")?;

    let mut fielded = Vec::with_capacity(frames.len());
    for frame in frames {
        ensure_same_shape(&flat.data, &frame)?;
        fielded.push(frame / &flat.data);
    }
    let sky = nan_median_stack(&fielded)?;

    header.set("DATAFILE", datafile_value(numbers));
    let path = sky_path(reduced_dir, target, &filter);
    let frame = Frame::with_header(sky, header);
    store.write_image(&frame, &path)?;
    info!(frames = numbers.len(), object = target, filter = %filter, "master sky written");
    Ok((frame, path))
}

/// Flat-field, sky-subtract, repair and integer-centre one science frame.
///
/// Sky pixels that are NaN (zero flat) are treated as 0. Returns the frame
/// and the integer pre-centering shift applied.
pub fn calibrate_science(
    raw: &Array2<f64>,
    flat: &Array2<f64>,
    sky: &Array2<f64>,
    instrument: &dyn Instrument,
) -> Result<(Array2<f64>, Shift)> {
    ensure_same_shape(flat, raw)?;
    ensure_same_shape(flat, sky)?;
    let sky = sky.mapv(|v| if v.is_nan() { 0.0 } else { v });
    let calibrated = raw / flat - sky;
    let repaired = instrument.repair_bad_pixels(&calibrated);
    Ok(shift_to_peak(&repaired))
}

/// Roll the brightest pixel (after a 7×7 median filter) onto the
/// geometric centre. Vacated pixels are 0.
pub fn shift_to_peak(image: &Array2<f64>) -> (Array2<f64>, Shift) {
    let Some(peak) = filtered_peak(image) else {
        debug!("no finite pixel; frame left in place");
        return (image.clone(), Shift::default());
    };
    let shift = Shift::between(peak, geometric_center(image));
    let shifted = roll_shift(image, shift.drow as isize, shift.dcol as isize, 0.0);
    (shifted, shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_paths() {
        let dir = Path::new("/red");
        assert_eq!(dark_path(dir, 1.6), PathBuf::from("/red/dark_2sec.fits"));
        assert_eq!(flat_path(dir, "Ks"), PathBuf::from("/red/flat_Ks.fits"));
        assert_eq!(sky_path(dir, "HD 1", "J"), PathBuf::from("/red/HD 1/J/sky.fits"));
    }

    #[test]
    fn test_shift_to_peak_centres_blob() {
        let mut image = Array2::zeros((41, 41));
        for r in 8..13 {
            for c in 28..33 {
                image[[r, c]] = 100.0;
            }
        }
        // The filtered plateau spans rows 9..=11, cols 29..=31; its first
        // pixel is moved to the centre.
        let (shifted, shift) = shift_to_peak(&image);
        assert_eq!(shift, Shift::new(11.0, -9.0));
        assert_eq!(shifted[[20, 20]], 100.0);
        let (_, again) = shift_to_peak(&shifted);
        assert_eq!(again, Shift::default());
    }
}
