use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::align::RegistrationStrategy;
use crate::error::{AoError, Result};

/// How a target was observed, as recorded in the log's `Method` column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationMethod {
    /// Unsaturated single star.
    Default,
    /// Saturated core.
    #[default]
    Saturated,
    /// Wide binary; the primary's rough position is supplied by the user.
    Wide,
    SaturatedWide,
    /// Faint or extended PSF, fitted across the whole set.
    PsfFit,
}

impl ObservationMethod {
    pub fn parse(text: &str) -> Result<Self> {
        let normalized = text.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match normalized.split_whitespace().collect::<Vec<_>>().join(" ").as_str() {
            "" | "saturated" => Ok(Self::Saturated),
            "default" => Ok(Self::Default),
            "wide" => Ok(Self::Wide),
            "saturated wide" | "wide saturated" => Ok(Self::SaturatedWide),
            "psf fit" | "psf" => Ok(Self::PsfFit),
            other => Err(AoError::ObsLog(format!("unknown method '{other}'"))),
        }
    }

    /// Registration strategy used for frames observed this way.
    pub fn strategy(self) -> RegistrationStrategy {
        match self {
            Self::Default | Self::Wide => RegistrationStrategy::Bruteforce,
            Self::Saturated | Self::SaturatedWide => RegistrationStrategy::Saturated,
            Self::PsfFit => RegistrationStrategy::PsfFit,
        }
    }

    pub fn needs_rough_center(self) -> bool {
        matches!(self, Self::Wide | Self::SaturatedWide)
    }
}

impl std::fmt::Display for ObservationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Saturated => write!(f, "saturated"),
            Self::Wide => write!(f, "wide"),
            Self::SaturatedWide => write!(f, "saturated wide"),
            Self::PsfFit => write!(f, "psf-fit"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LogRecord {
    #[serde(rename = "Object")]
    object: String,
    #[serde(rename = "ExpTime", default)]
    exp_time: Option<f64>,
    #[serde(rename = "Filter", default)]
    filter: Option<String>,
    #[serde(rename = "Comments", default)]
    comments: Option<String>,
    #[serde(rename = "Method", default)]
    method: Option<String>,
    #[serde(rename = "Filenums")]
    filenums: String,
}

/// One parsed row of the observation log.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub object: String,
    pub exp_time: f64,
    pub filter: String,
    pub comments: String,
    pub method: ObservationMethod,
    pub filenums: Vec<u32>,
}

impl LogEntry {
    pub fn is_dark(&self) -> bool {
        self.object.eq_ignore_ascii_case("dark")
    }

    pub fn is_flat(&self) -> bool {
        self.object.eq_ignore_ascii_case("flat")
    }

    /// Dark, flat and setup rows.
    pub fn is_calibration(&self) -> bool {
        self.is_dark() || self.is_flat() || self.object.eq_ignore_ascii_case("setup")
    }

    pub fn is_sky(&self) -> bool {
        !self.is_calibration() && self.comments.trim().eq_ignore_ascii_case("sky")
    }

    pub fn is_science(&self) -> bool {
        !self.is_calibration() && !self.is_sky()
    }
}

/// A night's observation log.
#[derive(Clone, Debug, Default)]
pub struct ObsLog {
    pub entries: Vec<LogEntry>,
}

impl ObsLog {
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AoError::FileNotFound(path.to_path_buf()));
        }
        let reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        Self::from_csv(reader)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        Self::from_csv(reader)
    }

    fn from_csv<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let mut entries = Vec::new();
        for (line, record) in reader.deserialize::<LogRecord>().enumerate() {
            let record = record?;
            let filenums = parse_filenums(&record.filenums)
                .map_err(|e| AoError::ObsLog(format!("row {}: {e}", line + 1)))?;
            let method = match record.method.as_deref() {
                Some(text) => ObservationMethod::parse(text)?,
                None => ObservationMethod::default(),
            };
            entries.push(LogEntry {
                object: record.object,
                exp_time: record.exp_time.unwrap_or(f64::NAN),
                filter: record.filter.unwrap_or_default(),
                comments: record.comments.unwrap_or_default(),
                method,
                filenums,
            });
        }
        Ok(Self { entries })
    }

    pub fn darks(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| e.is_dark())
    }

    pub fn flats(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| e.is_flat())
    }

    pub fn skies(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| e.is_sky())
    }

    pub fn science(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| e.is_science())
    }

    /// Sky row for a target observed through `filter`.
    pub fn sky_for(&self, object: &str, filter: &str) -> Option<&LogEntry> {
        self.skies().find(|e| e.object == object && e.filter == filter)
    }
}

/// Parse a `Filenums` cell.
///
/// Accepts `[1, 2, 3]`, `range(a, b)` (end excluded), `a-b` and `a:b`
/// (end included) and comma-separated mixtures of numbers and inclusive
/// ranges. Never evaluates the cell as code.
pub fn parse_filenums(text: &str) -> std::result::Result<Vec<u32>, String> {
    let s = text.trim();
    let s = s
        .strip_prefix("list(")
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(s)
        .trim();

    if let Some(args) = s.strip_prefix("range(").and_then(|rest| rest.strip_suffix(')')) {
        return parse_range_call(args);
    }

    let inner = s
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(s);

    let mut numbers = Vec::new();
    for item in inner.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        match item.split_once(['-', ':']) {
            Some((a, b)) => {
                let (a, b) = (parse_number(a)?, parse_number(b)?);
                if b < a {
                    return Err(format!("descending range '{item}'"));
                }
                numbers.extend(a..=b);
            }
            None => numbers.push(parse_number(item)?),
        }
    }
    if numbers.is_empty() {
        return Err(format!("no file numbers in '{text}'"));
    }
    Ok(numbers)
}

fn parse_range_call(args: &str) -> std::result::Result<Vec<u32>, String> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    let (start, end, step) = match parts.as_slice() {
        [end] => (0, parse_number(end)?, 1),
        [start, end] => (parse_number(start)?, parse_number(end)?, 1),
        [start, end, step] => (parse_number(start)?, parse_number(end)?, parse_number(step)?),
        _ => return Err(format!("malformed range({args})")),
    };
    if step == 0 {
        return Err("range step must be positive".into());
    }
    let numbers: Vec<u32> = (start..end).step_by(step as usize).collect();
    if numbers.is_empty() {
        return Err(format!("empty range({args})"));
    }
    Ok(numbers)
}

fn parse_number(text: &str) -> std::result::Result<u32, String> {
    let t = text.trim();
    // Spreadsheets export integer cells as "12.0".
    let t = t.strip_suffix(".0").unwrap_or(t);
    t.parse::<u32>().map_err(|_| format!("'{}' is not a file number", text.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_and_ranges() {
        assert_eq!(parse_filenums("[1, 2, 3]").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_filenums("range(10, 13)").unwrap(), vec![10, 11, 12]);
        assert_eq!(parse_filenums("5-7").unwrap(), vec![5, 6, 7]);
        assert_eq!(parse_filenums("5:7, 9").unwrap(), vec![5, 6, 7, 9]);
    }

    #[test]
    fn test_parse_rejects_code() {
        assert!(parse_filenums("__import__('os')").is_err());
        assert!(parse_filenums("").is_err());
        assert!(parse_filenums("7-5").is_err());
    }

    #[test]
    fn test_method_strategy() {
        assert_eq!(ObservationMethod::parse("saturated wide").unwrap(), ObservationMethod::SaturatedWide);
        assert_eq!(ObservationMethod::Wide.strategy(), RegistrationStrategy::Bruteforce);
        assert!(ObservationMethod::SaturatedWide.needs_rough_center());
        assert!(!ObservationMethod::Default.needs_rough_center());
    }
}
