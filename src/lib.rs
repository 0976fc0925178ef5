pub mod adapter;
pub mod config;
pub mod convert;
pub mod dsl;
pub mod error;
pub mod formats;
pub mod note;
pub mod rational;
pub mod slide;
pub mod time;

pub use adapter::{adapt_timeline, offset_chart, quantise_chart, Destination, Offset};
pub use config::ConvertOptions;
pub use dsl::render_dsl;
pub use error::*;
pub use note::*;
pub use time::{Epoch, Position, TempoCurve, TempoPoint};

/// Parse DSL chart text into a chart.
/// Fragments are parsed on one worker per core.
pub fn parse_dsl(text: &str) -> Result<Chart, ChartError> {
    dsl::ParserSession::new(None)?.parse(text)
}

/// Build a chart from tick format lines
pub fn parse_ticks<'a, I>(lines: I) -> Result<Chart, ChartError>
where
    I: IntoIterator<Item = &'a str>,
{
    formats::ma2::parse_records(lines)
}

/// Write a chart as tick format lines, moving a lead-in starting tempo to measure 0
pub fn render_ticks(chart: &Chart, resolution: u32) -> Result<Vec<String>, ChartError> {
    let rebased = convert::rebase(chart, Epoch::Zero)?;
    formats::ma2::render_records(&rebased, resolution)
}
