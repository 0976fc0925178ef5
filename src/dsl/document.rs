//! # DSL Documents
//!
//! A document bundles a song's charts with a little metadata:
//!
//! ```text
//! &title=Song Name
//! &artist=Someone
//! &lv_5=13+
//! &inote_5=(150)
//! 1,2,3,4,
//! || this line is a comment
//! E
//! ```
//!
//! Each `&key=value` entry runs until the next line starting with `&`, so chart
//! bodies may span many lines. Lines containing `||` are dropped from chart bodies.
//! Keys other than `title`, `artist`, `lv_N` and `inote_N` are ignored.

use super::parser::ParserSession;
use super::serializer::render_dsl;
use crate::error::{ChartError, Location};
use crate::note::Chart;
use log::{debug, warn};
use std::collections::BTreeMap;

const COMMENT_MARKER: &str = "||";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub title: String,
    pub artist: String,
    /// Level labels keyed by difficulty number
    pub levels: BTreeMap<u32, String>,
    /// Charts keyed by difficulty number
    pub charts: BTreeMap<u32, Chart>,
}

impl Document {
    /// Render the document back to text, charts in difficulty order
    pub fn render(&self, max_denominator: u32) -> Result<String, ChartError> {
        let mut text = String::new();
        text.push_str(&format!("&title={}\n", self.title));
        text.push_str(&format!("&artist={}\n", self.artist));
        for (difficulty, level) in &self.levels {
            text.push_str(&format!("&lv_{}={}\n", difficulty, level));
        }
        for (difficulty, chart) in &self.charts {
            let body = render_dsl(chart, max_denominator)?;
            text.push_str(&format!("&inote_{}={}\n", difficulty, body));
        }
        Ok(text)
    }
}

struct Entry {
    key: String,
    value: String,
    line: usize,
}

fn split_entries(text: &str) -> Result<Vec<Entry>, ChartError> {
    let mut entries: Vec<Entry> = Vec::new();

    for (index, line) in text.lines().enumerate() {
        if let Some(rest) = line.strip_prefix('&') {
            let (key, value) = rest.split_once('=').ok_or_else(|| {
                ChartError::malformed(format!("entry `{}` has no `=`", line.trim()))
                    .at(Location::Line(index + 1))
            })?;
            entries.push(Entry {
                key: key.trim().to_string(),
                value: value.to_string(),
                line: index + 1,
            });
        } else if let Some(entry) = entries.last_mut() {
            entry.value.push('\n');
            entry.value.push_str(line);
        }
    }

    Ok(entries)
}

fn difficulty(key: &str, prefix: &str, line: usize) -> Result<Option<u32>, ChartError> {
    match key.strip_prefix(prefix) {
        Some(number) => number.parse().map(Some).map_err(|_| {
            ChartError::malformed(format!("`{}` has no difficulty number", key))
                .at(Location::Line(line))
        }),
        None => Ok(None),
    }
}

fn strip_comments(body: &str) -> String {
    body.lines()
        .filter(|line| !line.contains(COMMENT_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a document, sharing one parser session across its charts
pub fn parse_document(text: &str, workers: Option<usize>) -> Result<Document, ChartError> {
    let mut session = ParserSession::new(workers)?;
    let mut document = Document::default();

    for entry in split_entries(text)? {
        if entry.key == "title" {
            document.title = entry.value.trim().to_string();
        } else if entry.key == "artist" {
            document.artist = entry.value.trim().to_string();
        } else if let Some(number) = difficulty(&entry.key, "lv_", entry.line)? {
            document.levels.insert(number, entry.value.trim().to_string());
        } else if let Some(number) = difficulty(&entry.key, "inote_", entry.line)? {
            let body = strip_comments(&entry.value);
            if body.trim().is_empty() {
                warn!("chart {} is empty, skipping", number);
                continue;
            }
            let chart = session
                .parse(&body)
                .map_err(|e| e.at(Location::Line(entry.line)))?;
            debug!("chart {}: {} notes", number, chart.notes().len());
            document.charts.insert(number, chart);
        }
    }

    Ok(document)
}
