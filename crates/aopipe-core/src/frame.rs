use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A single detector image in photon counts.
/// NaN marks invalid pixels (zero flat-field regions, interpolation gaps).
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (rows, cols)
    pub data: Array2<f64>,
    /// Header keywords carried from the source file
    pub header: FrameHeader,
}

impl Frame {
    pub fn new(data: Array2<f64>) -> Self {
        Self {
            data,
            header: FrameHeader::default(),
        }
    }

    pub fn with_header(data: Array2<f64>, header: FrameHeader) -> Self {
        Self { data, header }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Geometric center `(rows / 2, cols / 2)` using integer division.
    pub fn center(&self) -> Center {
        geometric_center(&self.data)
    }
}

/// Integer geometric center of an image.
pub fn geometric_center(data: &Array2<f64>) -> Center {
    let (rows, cols) = data.dim();
    Center::new((rows / 2) as f64, (cols / 2) as f64)
}

/// A header keyword value.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            // Some instruments write numbers as quoted strings.
            Self::Str(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) => Some(*v as i64),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }
}

impl std::fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{}", if *b { "T" } else { "F" }),
        }
    }
}

/// Ordered keyword/value map. Keywords are stored upper-case.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameHeader {
    cards: Vec<(String, HeaderValue)>,
}

impl FrameHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        let key = key.to_ascii_uppercase();
        self.cards.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HeaderValue::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    /// Insert or overwrite a keyword, keeping its original position.
    pub fn set(&mut self, key: &str, value: HeaderValue) {
        let key = key.to_ascii_uppercase();
        match self.cards.iter_mut().find(|(k, _)| *k == key) {
            Some(card) => card.1 = value,
            None => self.cards.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) {
        let key = key.to_ascii_uppercase();
        self.cards.retain(|(k, _)| *k != key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// A (row, col) image coordinate, possibly sub-pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Center {
    pub row: f64,
    pub col: f64,
}

impl Center {
    pub fn new(row: f64, col: f64) -> Self {
        Self { row, col }
    }

    pub fn distance(&self, other: &Center) -> f64 {
        ((self.row - other.row).powi(2) + (self.col - other.col).powi(2)).sqrt()
    }
}

/// A translation `(drow, dcol)` that moves image content by that amount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub drow: f64,
    pub dcol: f64,
}

impl Shift {
    pub fn new(drow: f64, dcol: f64) -> Self {
        Self { drow, dcol }
    }

    /// Shift that moves `from` onto `to`.
    pub fn between(from: Center, to: Center) -> Self {
        Self {
            drow: to.row - from.row,
            dcol: to.col - from.col,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.drow.fract() == 0.0 && self.dcol.fract() == 0.0
    }
}

impl std::ops::Add for Shift {
    type Output = Shift;

    fn add(self, rhs: Shift) -> Shift {
        Shift::new(self.drow + rhs.drow, self.dcol + rhs.dcol)
    }
}
