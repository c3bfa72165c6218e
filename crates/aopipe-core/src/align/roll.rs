use ndarray::Array2;

use crate::frame::Center;

/// Integer translation without wrap-around.
///
/// Content moves by `(drow, dcol)`; rows/columns vacated at the leading
/// edge are set to `fill`, and content pushed past the far edge is dropped.
pub fn roll_shift(image: &Array2<f64>, drow: isize, dcol: isize, fill: f64) -> Array2<f64> {
    let (h, w) = image.dim();
    let mut out = Array2::from_elem((h, w), fill);
    for row in 0..h {
        let src_row = row as isize - drow;
        if src_row < 0 || src_row >= h as isize {
            continue;
        }
        for col in 0..w {
            let src_col = col as isize - dcol;
            if src_col < 0 || src_col >= w as isize {
                continue;
            }
            out[[row, col]] = image[[src_row as usize, src_col as usize]];
        }
    }
    out
}

/// Square sub-window around a rough stellar position.
///
/// Spans `[center - half, center + half)` on each axis, clipped to the
/// image, where `half = rows / divisor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub row0: usize,
    pub col0: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Window {
    pub fn around(center: Center, half: usize, shape: (usize, usize)) -> Self {
        let (h, w) = shape;
        let r = center.row.round() as isize;
        let c = center.col.round() as isize;
        let half = half as isize;
        let row0 = (r - half).clamp(0, h as isize) as usize;
        let row1 = (r + half).clamp(0, h as isize) as usize;
        let col0 = (c - half).clamp(0, w as isize) as usize;
        let col1 = (c + half).clamp(0, w as isize) as usize;
        Self {
            row0,
            col0,
            rows: row1.saturating_sub(row0),
            cols: col1.saturating_sub(col0),
        }
    }

    /// Window of `rows`×`cols` centred on `(h / 2, w / 2)`, clipped to the image.
    pub fn centered(rows: usize, cols: usize, shape: (usize, usize)) -> Self {
        let (h, w) = shape;
        let rows = rows.min(h);
        let cols = cols.min(w);
        Self {
            row0: h / 2 - rows / 2,
            col0: w / 2 - cols / 2,
            rows,
            cols,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn extract(&self, image: &Array2<f64>) -> Array2<f64> {
        Array2::from_shape_fn((self.rows, self.cols), |(r, c)| {
            image[[self.row0 + r, self.col0 + c]]
        })
    }

    /// Map window coordinates back to the full image.
    pub fn to_image(&self, row: f64, col: f64) -> Center {
        Center::new(row + self.row0 as f64, col + self.col0 as f64)
    }
}

/// Crop the central `size`×`size` region (clipped to the image).
pub fn crop_center(image: &Array2<f64>, size: usize) -> Array2<f64> {
    Window::centered(size, size, image.dim()).extract(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roll_shift_fills_vacated_edges() {
        let image = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f64 + 1.0);
        let rolled = roll_shift(&image, 1, -2, 0.0);
        assert_eq!(rolled[[1, 0]], image[[0, 2]]);
        assert_eq!(rolled[[3, 1]], image[[2, 3]]);
        for c in 0..4 {
            assert_eq!(rolled[[0, c]], 0.0, "row 0 should be vacated");
        }
        for r in 0..4 {
            assert_eq!(rolled[[r, 2]], 0.0);
            assert_eq!(rolled[[r, 3]], 0.0);
        }
    }

    #[test]
    fn test_window_around_clips_to_image() {
        let window = Window::around(Center::new(2.0, 98.0), 12, (100, 100));
        assert_eq!(window.row0, 0);
        assert_eq!(window.rows, 14);
        assert_eq!(window.col0, 86);
        assert_eq!(window.cols, 14);
    }
}
