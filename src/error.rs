use std::fmt;
use thiserror::Error;

/// Where in the input an error was raised
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// Zero-based fragment index of DSL text, with the fragment as written
    Fragment { index: usize, text: String },
    /// One-based line number of a record-oriented format
    Line(usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Fragment { index, text } => write!(f, "fragment {} `{}`", index + 1, text),
            Location::Line(line) => write!(f, "line {}", line),
        }
    }
}

fn at_measure(position: &Option<f64>) -> String {
    match position {
        Some(measure) => format!(" at measure {}", measure),
        None => String::new(),
    }
}

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Malformed input: {message}")]
    MalformedInput { message: String },

    #[error("Invalid note{}: {message}", at_measure(.position))]
    InvalidNote {
        position: Option<f64>,
        message: String,
    },

    #[error("Slide direction from lane {} to lane {} is ambiguous", .start + 1, .end + 1)]
    AmbiguousDirection { start: u8, end: u8 },

    #[error("No tempo curve defined")]
    MissingTempoCurve,

    #[error("No starting tempo at or before measure {epoch}")]
    NoStartingTempo { epoch: u8 },

    #[error("End slide {slide_id} has no matching start slide")]
    UnresolvedSlidePair { slide_id: u32 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{location}: {source}")]
    Located {
        location: Location,
        source: Box<ChartError>,
    },
}

impl ChartError {
    pub fn malformed(message: impl Into<String>) -> Self {
        ChartError::MalformedInput {
            message: message.into(),
        }
    }

    pub fn invalid_note(position: f64, message: impl Into<String>) -> Self {
        ChartError::InvalidNote {
            position: Some(position),
            message: message.into(),
        }
    }

    /// Invalid note field that is not tied to a timeline position
    pub fn invalid_field(message: impl Into<String>) -> Self {
        ChartError::InvalidNote {
            position: None,
            message: message.into(),
        }
    }

    /// Attach input location context to an error
    pub fn at(self, location: Location) -> Self {
        ChartError::Located {
            location,
            source: Box::new(self),
        }
    }

    /// The underlying error kind, with any location context stripped
    pub fn root(&self) -> &ChartError {
        match self {
            ChartError::Located { source, .. } => source.root(),
            other => other,
        }
    }

    /// The location of the error, if one was attached
    pub fn location(&self) -> Option<&Location> {
        match self {
            ChartError::Located { location, .. } => Some(location),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_located_error_display() {
        let err = ChartError::malformed("divisor must be positive").at(Location::Fragment {
            index: 2,
            text: "{0}1".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "fragment 3 `{0}1`: Malformed input: divisor must be positive"
        );
    }

    #[test]
    fn test_root_strips_location() {
        let err = ChartError::UnresolvedSlidePair { slide_id: 7 }.at(Location::Line(12));
        match err.root() {
            ChartError::UnresolvedSlidePair { slide_id } => assert_eq!(*slide_id, 7),
            _ => panic!("Expected UnresolvedSlidePair"),
        }
        assert_eq!(err.location(), Some(&Location::Line(12)));
    }

    #[test]
    fn test_invalid_note_display() {
        let err = ChartError::invalid_note(1.5, "hold duration must not be negative, got -0.25");
        assert_eq!(
            err.to_string(),
            "Invalid note at measure 1.5: hold duration must not be negative, got -0.25"
        );
        let err = ChartError::invalid_field("lane 8 is out of range 0..=7");
        assert_eq!(err.to_string(), "Invalid note: lane 8 is out of range 0..=7");
    }

    #[test]
    fn test_ambiguous_direction_uses_one_based_lanes() {
        let err = ChartError::AmbiguousDirection { start: 0, end: 4 };
        assert_eq!(err.to_string(), "Slide direction from lane 1 to lane 5 is ambiguous");
    }
}
