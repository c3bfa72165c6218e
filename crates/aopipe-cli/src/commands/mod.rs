pub mod analyze;
pub mod config;
pub mod contrast;
pub mod info;
pub mod run;
pub mod stack;
pub mod summarize;

use anyhow::{bail, Result};
use aopipe_core::frame::Center;

/// Parse a `row,col` pair.
pub fn parse_center(text: &str) -> Result<Center> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    let [row, col] = parts.as_slice() else {
        bail!("expected ROW,COL, got '{text}'");
    };
    Ok(Center::new(row.parse()?, col.parse()?))
}
