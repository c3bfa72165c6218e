use std::f64::consts::PI;

use ndarray::Array2;

use crate::frame::Center;
use crate::stats::sector::in_annulus;

/// Inclusive row/col bounding box of a circle of `radius` clipped to the image.
fn bounding_box(center: Center, radius: f64, shape: (usize, usize)) -> Option<(usize, usize, usize, usize)> {
    let (h, w) = shape;
    if h == 0 || w == 0 {
        return None;
    }
    let row_lo = (center.row - radius - 0.5).floor();
    let row_hi = (center.row + radius + 0.5).ceil();
    let col_lo = (center.col - radius - 0.5).floor();
    let col_hi = (center.col + radius + 0.5).ceil();
    if row_hi < 0.0 || col_hi < 0.0 || row_lo > (h - 1) as f64 || col_lo > (w - 1) as f64 {
        return None;
    }
    Some((
        row_lo.max(0.0) as usize,
        (row_hi as usize).min(h - 1),
        col_lo.max(0.0) as usize,
        (col_hi as usize).min(w - 1),
    ))
}

/// A circular photometric aperture.
#[derive(Clone, Copy, Debug)]
pub struct CircularAperture {
    pub center: Center,
    pub radius: f64,
}

impl CircularAperture {
    pub fn new(center: Center, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Analytic area `πr²`.
    pub fn area(&self) -> f64 {
        PI * self.radius * self.radius
    }

    /// Exact fractional overlap of the circle with every pixel it touches.
    ///
    /// Returns `(row, col, weight)` triples with `weight > 0`. Pixel `(r, c)`
    /// covers `[r - 0.5, r + 0.5] × [c - 0.5, c + 0.5]`.
    pub fn exact_weights(&self, shape: (usize, usize)) -> Vec<(usize, usize, f64)> {
        let Some((r0, r1, c0, c1)) = bounding_box(self.center, self.radius, shape) else {
            return Vec::new();
        };
        let mut weights = Vec::new();
        for row in r0..=r1 {
            let ymin = row as f64 - 0.5 - self.center.row;
            for col in c0..=c1 {
                let xmin = col as f64 - 0.5 - self.center.col;
                let overlap = circle_rect_overlap(xmin, ymin, xmin + 1.0, ymin + 1.0, self.radius);
                if overlap > 0.0 {
                    weights.push((row, col, overlap));
                }
            }
        }
        weights
    }

    /// Cutout of `image` over the aperture's clipped bounding box together
    /// with the matching exact-overlap weight grid.
    pub fn weighted_cutout(&self, image: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let Some((r0, r1, c0, c1)) = bounding_box(self.center, self.radius, image.dim()) else {
            return (Array2::zeros((0, 0)), Array2::zeros((0, 0)));
        };
        let shape = (r1 - r0 + 1, c1 - c0 + 1);
        let values = Array2::from_shape_fn(shape, |(r, c)| image[[r0 + r, c0 + c]]);
        let mut weights = Array2::<f64>::zeros(shape);
        for (row, col, w) in self.exact_weights(image.dim()) {
            weights[[row - r0, col - c0]] = w;
        }
        (values, weights)
    }

    /// Weighted aperture sum over finite pixels, after subtracting `offset`
    /// from every pixel. Returns `(sum, total_weight)`.
    pub fn weighted_sum(&self, image: &Array2<f64>, offset: f64) -> (f64, f64) {
        self.exact_weights(image.dim())
            .into_iter()
            .filter(|&(r, c, _)| image[[r, c]].is_finite())
            .fold((0.0, 0.0), |(sum, total), (r, c, w)| {
                (sum + w * (image[[r, c]] - offset), total + w)
            })
    }
}

/// A circular annulus `[r_in, r_out)`.
#[derive(Clone, Copy, Debug)]
pub struct CircularAnnulus {
    pub center: Center,
    pub r_in: f64,
    pub r_out: f64,
}

impl CircularAnnulus {
    pub fn new(center: Center, r_in: f64, r_out: f64) -> Self {
        Self { center, r_in, r_out }
    }

    pub fn area(&self) -> f64 {
        PI * (self.r_out * self.r_out - self.r_in * self.r_in)
    }

    /// Pixel values whose centres fall inside the annulus.
    pub fn center_pixels(&self, image: &Array2<f64>) -> Vec<f64> {
        let Some((r0, r1, c0, c1)) = bounding_box(self.center, self.r_out, image.dim()) else {
            return Vec::new();
        };
        let mut values = Vec::new();
        for row in r0..=r1 {
            let dr = row as f64 - self.center.row;
            for col in c0..=c1 {
                let dc = col as f64 - self.center.col;
                if in_annulus((dr * dr + dc * dc).sqrt(), self.r_in, self.r_out) {
                    values.push(image[[row, col]]);
                }
            }
        }
        values
    }
}

/// Area of the intersection between the rectangle `[xmin, xmax] × [ymin, ymax]`
/// and a circle of radius `r` at the origin.
pub fn circle_rect_overlap(xmin: f64, ymin: f64, xmax: f64, ymax: f64, r: f64) -> f64 {
    if r <= 0.0 {
        return 0.0;
    }
    if xmin >= 0.0 {
        if ymin >= 0.0 {
            quadrant_overlap(xmin, ymin, xmax, ymax, r)
        } else if ymax <= 0.0 {
            quadrant_overlap(-ymax, xmin, -ymin, xmax, r)
        } else {
            circle_rect_overlap(xmin, ymin, xmax, 0.0, r) + circle_rect_overlap(xmin, 0.0, xmax, ymax, r)
        }
    } else if xmax <= 0.0 {
        if ymin >= 0.0 {
            quadrant_overlap(-xmax, ymin, -xmin, ymax, r)
        } else if ymax <= 0.0 {
            quadrant_overlap(-xmax, -ymax, -xmin, -ymin, r)
        } else {
            circle_rect_overlap(xmin, ymin, xmax, 0.0, r) + circle_rect_overlap(xmin, 0.0, xmax, ymax, r)
        }
    } else {
        circle_rect_overlap(xmin, ymin, 0.0, ymax, r) + circle_rect_overlap(0.0, ymin, xmax, ymax, r)
    }
}

/// Overlap for a rectangle entirely in the first quadrant.
fn quadrant_overlap(xmin: f64, ymin: f64, xmax: f64, ymax: f64, r: f64) -> f64 {
    let r2 = r * r;
    if xmin * xmin + ymin * ymin > r2 {
        return 0.0;
    }
    if xmax * xmax + ymax * ymax < r2 {
        return (xmax - xmin) * (ymax - ymin);
    }

    let d1 = (xmax * xmax + ymin * ymin).sqrt();
    let d2 = (xmin * xmin + ymax * ymax).sqrt();
    if d1 < r && d2 < r {
        let (x1, y1) = ((r2 - ymax * ymax).sqrt(), ymax);
        let (x2, y2) = (xmax, (r2 - xmax * xmax).sqrt());
        (xmax - xmin) * (ymax - ymin) - triangle_area(x1, y1, x2, y2, xmax, ymax)
            + segment_area(x1, y1, x2, y2, r)
    } else if d1 < r {
        let (x1, y1) = (xmin, (r2 - xmin * xmin).sqrt());
        let (x2, y2) = (xmax, (r2 - xmax * xmax).sqrt());
        segment_area(x1, y1, x2, y2, r)
            + triangle_area(x1, y1, x1, ymin, xmax, ymin)
            + triangle_area(x1, y1, x2, ymin, x2, y2)
    } else if d2 < r {
        let (x1, y1) = ((r2 - ymin * ymin).sqrt(), ymin);
        let (x2, y2) = ((r2 - ymax * ymax).sqrt(), ymax);
        segment_area(x1, y1, x2, y2, r)
            + triangle_area(x1, y1, xmin, y1, xmin, ymax)
            + triangle_area(x1, y1, xmin, y2, x2, y2)
    } else {
        let (x1, y1) = ((r2 - ymin * ymin).sqrt(), ymin);
        let (x2, y2) = (xmin, (r2 - xmin * xmin).sqrt());
        segment_area(x1, y1, x2, y2, r) + triangle_area(x1, y1, x2, y2, xmin, ymin)
    }
}

/// Circular segment cut off by the chord between two points on the circle.
fn segment_area(x1: f64, y1: f64, x2: f64, y2: f64, r: f64) -> f64 {
    let chord = ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt();
    let theta = 2.0 * (0.5 * chord / r).min(1.0).asin();
    0.5 * r * r * (theta - theta.sin())
}

fn triangle_area(x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) -> f64 {
    0.5 * (x1 * (y2 - y3) + x2 * (y3 - y1) + x3 * (y1 - y2)).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_circle_weights_sum_to_area() {
        let aperture = CircularAperture::new(Center::new(20.3, 19.7), 5.5);
        let total: f64 = aperture.exact_weights((40, 40)).iter().map(|w| w.2).sum();
        assert!(
            (total - aperture.area()).abs() < 1e-9,
            "Weights should integrate to the circle area, got {total}"
        );
    }

    #[test]
    fn test_pixel_inside_circle_has_unit_weight() {
        let overlap = circle_rect_overlap(-0.5, -0.5, 0.5, 0.5, 3.0);
        assert!((overlap - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_small_circle_inside_pixel() {
        let overlap = circle_rect_overlap(-0.5, -0.5, 0.5, 0.5, 0.25);
        assert!((overlap - PI * 0.0625).abs() < 1e-12);
    }

    #[test]
    fn test_truncated_at_image_edge() {
        let aperture = CircularAperture::new(Center::new(0.0, 10.0), 4.0);
        let total: f64 = aperture.exact_weights((20, 20)).iter().map(|w| w.2).sum();
        // Slightly more than half the circle: the row-0 pixels extend to -0.5.
        assert!(total > aperture.area() / 2.0 && total < aperture.area());
    }
}
