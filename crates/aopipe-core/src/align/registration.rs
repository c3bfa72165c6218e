use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::frame::Shift;

/// Centroiding strategy for one frame set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationStrategy {
    /// Threshold search for isolated peaks.
    Bruteforce,
    /// Four-fold rotational symmetry search for saturated cores.
    #[default]
    Saturated,
    /// Ensemble-sampled Gaussian fits across the set.
    PsfFit,
}

impl std::fmt::Display for RegistrationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bruteforce => write!(f, "bruteforce"),
            Self::Saturated => write!(f, "saturated"),
            Self::PsfFit => write!(f, "psf-fit"),
        }
    }
}

/// An aligned frame and how it was obtained.
#[derive(Clone, Debug)]
pub struct Registration {
    pub image: Array2<f64>,
    /// Translation applied to the input frame.
    pub shift: Shift,
    /// Strategy that produced the result (after any fallback).
    pub strategy: RegistrationStrategy,
    /// Normalised rotational residual surface, saturated strategy only.
    pub residual_map: Option<Array2<f64>>,
}
