//! # Conversion Options
//!
//! Settings shared by every conversion, loadable from a YAML file:
//!
//! ```yaml
//! max-denominator: 1000
//! resolution: 384
//! offset: 1.5s
//! quantise: 192
//! fixed-bpm: 150
//! convert-touch: true
//! workers: 4
//! ```
//!
//! Every key is optional. Command-line flags override file values.

use crate::adapter::Offset;
use crate::error::ChartError;
use crate::formats::ma2::DEFAULT_RESOLUTION;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_MAX_DENOMINATOR: u32 = 1000;

/// An offset written either as a bare number of measures or as text
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum RawOffset {
    Measures(f64),
    Text(String),
}

/// Raw options for YAML deserialization
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawOptions {
    pub max_denominator: Option<u32>,
    pub resolution: Option<u32>,
    pub offset: Option<RawOffset>,
    pub quantise: Option<u32>,
    pub fixed_bpm: Option<f64>,
    pub convert_touch: Option<bool>,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    /// Denominator bound for the DSL serializer
    pub max_denominator: u32,
    /// Ticks per measure for tick format output
    pub resolution: u32,
    pub offset: Option<Offset>,
    /// Grid to snap positions to, in divisions per measure
    pub quantise: Option<u32>,
    /// Tempo for fixed-tempo output; the chart's starting tempo when unset
    pub fixed_bpm: Option<f64>,
    pub convert_touch: bool,
    /// DSL parser pool size; one worker per core when unset
    pub workers: Option<usize>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            max_denominator: DEFAULT_MAX_DENOMINATOR,
            resolution: DEFAULT_RESOLUTION,
            offset: None,
            quantise: None,
            fixed_bpm: None,
            convert_touch: false,
            workers: None,
        }
    }
}

impl ConvertOptions {
    pub fn from_yaml(content: &str) -> Result<Self, ChartError> {
        let raw: RawOptions =
            serde_yaml::from_str(content).map_err(|e| ChartError::Config(e.to_string()))?;
        Self::default().merge(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ChartError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChartError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Apply every value set in `raw` on top of these options
    pub fn merge(mut self, raw: RawOptions) -> Result<Self, ChartError> {
        if let Some(max_denominator) = raw.max_denominator {
            self.max_denominator = max_denominator;
        }
        if let Some(resolution) = raw.resolution {
            self.resolution = resolution;
        }
        match raw.offset {
            Some(RawOffset::Measures(measures)) => self.offset = Some(Offset::Measures(measures)),
            Some(RawOffset::Text(text)) => self.offset = Some(text.parse()?),
            None => {}
        }
        if raw.quantise.is_some() {
            self.quantise = raw.quantise;
        }
        if raw.fixed_bpm.is_some() {
            self.fixed_bpm = raw.fixed_bpm;
        }
        if let Some(convert_touch) = raw.convert_touch {
            self.convert_touch = convert_touch;
        }
        if raw.workers.is_some() {
            self.workers = raw.workers;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ChartError> {
        if self.max_denominator == 0 {
            return Err(ChartError::Config("max-denominator must be positive".to_string()));
        }
        if self.resolution == 0 {
            return Err(ChartError::Config("resolution must be positive".to_string()));
        }
        if self.quantise == Some(0) {
            return Err(ChartError::Config("quantise grid must be positive".to_string()));
        }
        if let Some(bpm) = self.fixed_bpm {
            if !(bpm.is_finite() && bpm > 0.0) {
                return Err(ChartError::Config(format!("Invalid fixed-bpm: {}", bpm)));
            }
        }
        if self.workers == Some(0) {
            return Err(ChartError::Config("workers must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let options = ConvertOptions::from_yaml("{}").unwrap();
        assert_eq!(options, ConvertOptions::default());
        assert_eq!(options.max_denominator, 1000);
        assert_eq!(options.resolution, 384);
    }

    #[test]
    fn test_parse_all_keys() {
        let yaml = r#"
max-denominator: 64
resolution: 1920
offset: 1.5s
quantise: 192
fixed-bpm: 150
convert-touch: true
workers: 2
"#;
        let result = ConvertOptions::from_yaml(yaml);
        assert!(result.is_ok());
        let options = result.unwrap();
        assert_eq!(options.max_denominator, 64);
        assert_eq!(options.resolution, 1920);
        assert_eq!(options.offset, Some(Offset::Seconds(1.5)));
        assert_eq!(options.quantise, Some(192));
        assert_eq!(options.fixed_bpm, Some(150.0));
        assert!(options.convert_touch);
        assert_eq!(options.workers, Some(2));
    }

    #[test]
    fn test_numeric_offset() {
        let options = ConvertOptions::from_yaml("offset: -0.5").unwrap();
        assert_eq!(options.offset, Some(Offset::Measures(-0.5)));
    }

    #[test]
    fn test_fraction_offset() {
        let options = ConvertOptions::from_yaml("offset: 1/4").unwrap();
        assert_eq!(options.offset, Some(Offset::Measures(0.25)));
    }

    #[test]
    fn test_rejects_zero_resolution() {
        let result = ConvertOptions::from_yaml("resolution: 0");
        match result {
            Err(ChartError::Config(message)) => assert!(message.contains("resolution")),
            _ => panic!("Expected Config error"),
        }
    }

    #[test]
    fn test_rejects_unknown_key() {
        assert!(matches!(
            ConvertOptions::from_yaml("colour: red"),
            Err(ChartError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fixed-bpm: 200").unwrap();
        let options = ConvertOptions::load(file.path()).unwrap();
        assert_eq!(options.fixed_bpm, Some(200.0));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConvertOptions::load(Path::new("/nonexistent/options.yaml"));
        assert!(matches!(result, Err(ChartError::Config(_))));
    }
}
