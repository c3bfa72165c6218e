use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AoError, Result};

/// One row of a contrast curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContrastPoint {
    /// Separation from the star, arcseconds.
    #[serde(rename = "arcsec")]
    pub separation: f64,
    /// Detection limit, delta magnitudes.
    #[serde(rename = "dmag")]
    pub delta_mag: f64,
    #[serde(rename = "dmrms")]
    pub uncertainty: f64,
}

/// Separation-ordered contrast curve. The first point is the on-axis
/// reference at separation 0.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContrastCurve {
    pub points: Vec<ContrastPoint>,
}

impl ContrastCurve {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn separations(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.separation).collect()
    }

    pub fn contrasts(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.delta_mag).collect()
    }

    pub fn uncertainties(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.uncertainty).collect()
    }

    /// Write as `arcsec,dmag,dmrms` CSV, overwriting `path`.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for point in &self.points {
            writer.serialize(point)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AoError::FileNotFound(path.to_path_buf()));
        }
        let mut reader = csv::Reader::from_path(path)?;
        let points = reader
            .deserialize()
            .collect::<std::result::Result<Vec<ContrastPoint>, csv::Error>>()?;
        Ok(Self { points })
    }
}
