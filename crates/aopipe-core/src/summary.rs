//! Night-level products gathered from a reduced directory tree laid out
//! as `<reduced>/<target>/<filter>/`.

use std::path::{Path, PathBuf};

use ndarray::{s, Array2};
use serde::Serialize;
use tracing::{info, warn};

use crate::consts::SUMMARY_CUTOUT_SIZE;
use crate::contrast::ContrastCurve;
use crate::error::Result;
use crate::io::preview::{mosaic, save_preview};
use crate::io::read_fits;

/// Display range of the night image grid.
const GRID_VMIN: f64 = -10.0;
const GRID_VMAX: f64 = 10_000.0;

/// A per-target file found under the reduced directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReducedProduct {
    pub target: String,
    pub filter: String,
    pub path: PathBuf,
}

/// Contrast curve of one target and filter.
#[derive(Clone, Debug)]
pub struct TargetCurve {
    pub target: String,
    pub filter: String,
    pub curve: ContrastCurve,
}

#[derive(Serialize)]
struct CurveRow<'a> {
    target: &'a str,
    filter: &'a str,
    arcsec: f64,
    dmag: f64,
    dmrms: f64,
}

/// Paths written by [`summarize_night`].
#[derive(Clone, Debug, Default)]
pub struct NightProducts {
    pub contrast_curves: Option<PathBuf>,
    pub image_grid: Option<PathBuf>,
    pub curves: usize,
    pub images: usize,
}

/// Every `<target>/<filter>/<file_name>` below `reduced_dir`, sorted by
/// target then filter.
pub fn find_products(reduced_dir: &Path, file_name: &str) -> Result<Vec<ReducedProduct>> {
    let mut products = Vec::new();
    for target in sorted_dirs(reduced_dir)? {
        for filter in sorted_dirs(&target)? {
            let path = filter.join(file_name);
            if path.is_file() {
                products.push(ReducedProduct {
                    target: file_name_of(&target),
                    filter: file_name_of(&filter),
                    path,
                });
            }
        }
    }
    Ok(products)
}

/// Read every per-target contrast curve of the night.
pub fn nightly_contrast_curves(reduced_dir: &Path) -> Result<Vec<TargetCurve>> {
    find_products(reduced_dir, "contrast_curve.csv")?
        .into_iter()
        .map(|product| -> Result<TargetCurve> {
            Ok(TargetCurve {
                curve: ContrastCurve::read_csv(&product.path)?,
                target: product.target,
                filter: product.filter,
            })
        })
        .collect()
}

/// Write all curves as one long-format `target,filter,arcsec,dmag,dmrms` CSV.
pub fn write_nightly_contrast_csv(curves: &[TargetCurve], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for entry in curves {
        for point in &entry.curve.points {
            writer.serialize(CurveRow {
                target: &entry.target,
                filter: &entry.filter,
                arcsec: point.separation,
                dmag: point.delta_mag,
                dmrms: point.uncertainty,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Central `size` x `size` cutout, clipped to the image.
pub fn central_cutout(data: &Array2<f64>, size: usize) -> Array2<f64> {
    let (h, w) = data.dim();
    let rows = size.min(h);
    let cols = size.min(w);
    let r0 = (h - rows) / 2;
    let c0 = (w - cols) / 2;
    data.slice(s![r0..r0 + rows, c0..c0 + cols]).to_owned()
}

/// Mosaic of the central cutouts of every `final_im.fits`, saved as a PNG.
///
/// Returns the number of tiles; nothing is written when there are none.
pub fn image_grid(reduced_dir: &Path, output: &Path) -> Result<usize> {
    let mut tiles = Vec::new();
    for product in find_products(reduced_dir, "final_im.fits")? {
        let Some(frame) = read_fits(&product.path)?.into_iter().next() else {
            warn!(path = %product.path.display(), "final image holds no data; skipped");
            continue;
        };
        let cutout = central_cutout(&frame.data, SUMMARY_CUTOUT_SIZE);
        if cutout.dim() != (SUMMARY_CUTOUT_SIZE, SUMMARY_CUTOUT_SIZE) {
            warn!(
                target = %product.target,
                filter = %product.filter,
                "final image smaller than the grid cutout; skipped"
            );
            continue;
        }
        tiles.push(cutout);
    }
    if tiles.is_empty() {
        return Ok(0);
    }
    let columns = (tiles.len() as f64).sqrt().ceil() as usize;
    save_preview(&mosaic(&tiles, columns), output, Some(GRID_VMIN), Some(GRID_VMAX))?;
    Ok(tiles.len())
}

/// Write `all_contrast_curves.csv` and `all_stars.png` into `reduced_dir`.
pub fn summarize_night(reduced_dir: &Path) -> Result<NightProducts> {
    let mut products = NightProducts::default();

    let curves = nightly_contrast_curves(reduced_dir)?;
    if curves.is_empty() {
        warn!(dir = %reduced_dir.display(), "no contrast curves found");
    } else {
        let path = reduced_dir.join("all_contrast_curves.csv");
        write_nightly_contrast_csv(&curves, &path)?;
        products.curves = curves.len();
        products.contrast_curves = Some(path);
    }

    let grid = reduced_dir.join("all_stars.png");
    products.images = image_grid(reduced_dir, &grid)?;
    if products.images > 0 {
        products.image_grid = Some(grid);
    }

    info!(
        curves = products.curves,
        images = products.images,
        "night summary written"
    );
    Ok(products)
}

fn sorted_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_central_cutout_is_centred() {
        let data = Array2::from_shape_fn((10, 12), |(r, c)| (r * 100 + c) as f64);
        let cut = central_cutout(&data, 4);
        assert_eq!(cut.dim(), (4, 4));
        assert_eq!(cut[[0, 0]], 304.0);
        assert_eq!(central_cutout(&data, 50).dim(), (10, 12));
    }
}
