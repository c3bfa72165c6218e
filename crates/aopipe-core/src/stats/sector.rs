use ndarray::Array2;

use crate::frame::Center;

use super::robust::{nan_median, robust_stats};

/// Background statistics of one angular sector of an annulus.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SectorStats {
    /// Median of every finite pixel in the sector.
    pub median: f64,
    /// Clipped mean.
    pub mean: f64,
    /// Clipped standard deviation.
    pub std: f64,
    /// Finite pixels the sector started with.
    pub pixels: usize,
}

impl SectorStats {
    /// Median plus clipped mean/std of a sector's pixel values.
    pub fn from_pixels(values: &[f64], clip_sigma: f64, converge_frac: f64) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let clipped = robust_stats(&finite, clip_sigma, converge_frac);
        Self {
            median: nan_median(&finite),
            mean: clipped.mean,
            std: clipped.std,
            pixels: finite.len(),
        }
    }
}

/// Polar angle of `(row, col)` about `center` in degrees, in `[0, 360)`.
///
/// `atan2(row - center.row, col - center.col)` shifted by 180°.
pub fn polar_angle_deg(row: f64, col: f64, center: Center) -> f64 {
    let theta = (row - center.row).atan2(col - center.col).to_degrees() + 180.0;
    theta.rem_euclid(360.0)
}

/// Whether a pixel centre at distance `d` lies in `[r_in, r_out)`.
pub fn in_annulus(d: f64, r_in: f64, r_out: f64) -> bool {
    d >= r_in && d < r_out
}

/// An angular wedge of an annulus: radii `[r_in, r_out)`, polar angles
/// `[angle_start, angle_end)` in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnularSector {
    pub r_in: f64,
    pub r_out: f64,
    pub angle_start: f64,
    pub angle_end: f64,
}

impl AnnularSector {
    /// Sector `index` of `count` equal wedges of the annulus.
    pub fn of_annulus(r_in: f64, r_out: f64, index: usize, count: usize) -> Self {
        let count = count.max(1);
        let width = 360.0 / count as f64;
        // The last wedge closes at exactly 360 degrees.
        let angle_end = if index + 1 >= count {
            360.0
        } else {
            (index + 1) as f64 * width
        };
        Self {
            r_in,
            r_out,
            angle_start: index as f64 * width,
            angle_end,
        }
    }
}

/// Statistics of the pixels of `image` inside `sector` about `center`.
///
/// Pixels outside the image simply do not contribute; a sector with no
/// finite pixels reports NaN for every field.
pub fn sector_stats(
    image: &Array2<f64>,
    center: Center,
    sector: AnnularSector,
    clip_sigma: f64,
    converge_frac: f64,
) -> SectorStats {
    let mut values = Vec::new();
    for_each_annulus_pixel(image, center, sector.r_in, sector.r_out, |row, col, v| {
        let angle = polar_angle_deg(row as f64, col as f64, center);
        if angle >= sector.angle_start && angle < sector.angle_end {
            values.push(v);
        }
    });
    SectorStats::from_pixels(&values, clip_sigma, converge_frac)
}

/// Visit every pixel whose centre lies in `[r_in, r_out)` of `center`.
///
/// Rows are walked along the outer chord only, skipping the columns that
/// lie wholly inside the inner radius.
fn for_each_annulus_pixel<F>(image: &Array2<f64>, center: Center, r_in: f64, r_out: f64, mut visit: F)
where
    F: FnMut(usize, usize, f64),
{
    let (h, w) = image.dim();
    if h == 0 || w == 0 || r_out.is_nan() || r_out <= 0.0 {
        return;
    }
    let last_col = w as isize - 1;
    let row_lo = (center.row - r_out).floor().max(0.0) as usize;
    let row_hi = (center.row + r_out).ceil().min((h - 1) as f64);
    if row_hi < 0.0 {
        return;
    }

    for row in row_lo..=row_hi as usize {
        let dy = row as f64 - center.row;
        if dy.abs() >= r_out {
            continue;
        }
        let half_out = (r_out * r_out - dy * dy).sqrt();
        let lo = ((center.col - half_out).floor() as isize - 1).max(0);
        let hi = ((center.col + half_out).ceil() as isize + 1).min(last_col);

        // Columns with |dx| <= half_in - 1 are strictly inside r_in.
        let (hole_lo, hole_hi) = if dy.abs() < r_in {
            let half_in = (r_in * r_in - dy * dy).sqrt();
            (
                (center.col - half_in).ceil() as isize + 1,
                (center.col + half_in).floor() as isize - 1,
            )
        } else {
            (1, 0)
        };

        let mut col = lo;
        while col <= hi {
            if col >= hole_lo && col <= hole_hi {
                col = hole_hi + 1;
                continue;
            }
            let dx = col as f64 - center.col;
            if in_annulus((dx * dx + dy * dy).sqrt(), r_in, r_out) {
                visit(row, col as usize, image[[row, col as usize]]);
            }
            col += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chord_walk_matches_full_scan() {
        let image = Array2::from_shape_fn((40, 50), |(r, c)| (r * 50 + c) as f64);
        let center = Center::new(17.3, 31.6);
        for &(r_in, r_out) in &[(0.0, 3.0), (4.0, 9.5), (12.0, 40.0), (30.0, 80.0)] {
            let mut walked = Vec::new();
            for_each_annulus_pixel(&image, center, r_in, r_out, |_, _, v| walked.push(v));

            let scanned: Vec<f64> = image
                .indexed_iter()
                .filter(|&((r, c), _)| {
                    let d = ((r as f64 - center.row).powi(2) + (c as f64 - center.col).powi(2)).sqrt();
                    in_annulus(d, r_in, r_out)
                })
                .map(|(_, &v)| v)
                .collect();
            assert_eq!(walked, scanned, "annulus [{r_in}, {r_out})");
        }
    }
}
