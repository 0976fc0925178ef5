//! # Record Formats
//!
//! Line-oriented chart formats that store one note or event per record.
//!
//! - `ma2` - Tab-separated tick records with any number of tempo changes
//! - `sdt` - Comma-separated records in measures under one fixed tempo
//!
//! Both readers take lines and report errors with the one-based line number of
//! the offending record.

pub mod ma2;
pub mod sdt;

use crate::error::ChartError;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Chart notations the converter reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Dsl,
    Ma2,
    Sdt,
}

impl Format {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Format> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "txt" | "simai" | "dsl" => Some(Format::Dsl),
            "ma2" => Some(Format::Ma2),
            "sdt" => Some(Format::Sdt),
            _ => None,
        }
    }
}

impl FromStr for Format {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dsl" | "simai" => Ok(Format::Dsl),
            "ma2" => Ok(Format::Ma2),
            "sdt" => Ok(Format::Sdt),
            other => Err(ChartError::Config(format!("Unknown format `{}`", other))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Dsl => "dsl",
            Format::Ma2 => "ma2",
            Format::Sdt => "sdt",
        };
        write!(f, "{}", name)
    }
}

/// Parse column `index` of a record
pub(crate) fn field<T: FromStr>(values: &[&str], index: usize, name: &str) -> Result<T, ChartError> {
    let raw = values.get(index).ok_or_else(|| {
        ChartError::malformed(format!(
            "`{}` record is missing its {} column",
            values.first().copied().unwrap_or_default(),
            name
        ))
    })?;
    raw.trim()
        .parse()
        .map_err(|_| ChartError::malformed(format!("`{}` is not a valid {}", raw.trim(), name)))
}
