//! # Cross-Format Conversion
//!
//! Each format has its own tempo model. The tick format keeps a full tempo curve
//! starting at measure 0, the fixed-tempo format has a single tempo, and the DSL
//! starts its curve at measure 1. The helpers here move a chart between those
//! models without changing when any note sounds.

use crate::adapter::{adapt_timeline, Destination};
use crate::error::ChartError;
use crate::note::Chart;
use crate::time::{Epoch, Position, TempoCurve, TempoPoint};
use log::debug;

/// Re-anchor a chart's tempo curve to another epoch
///
/// A starting tempo inside the lead-in measure moves to measure 0 when the
/// target epoch is zero. Positions before the first tempo already play at that
/// tempo, so no note changes time.
pub fn rebase(chart: &Chart, epoch: Epoch) -> Result<Chart, ChartError> {
    chart.tempo().validate()?;
    let mut points: Vec<TempoPoint> = chart.tempo().points().to_vec();
    if epoch == Epoch::Zero {
        if let Some(first) = points.first_mut() {
            if first.position <= Position::ONE {
                first.position = Position::ZERO;
            }
        }
    }

    let mut rebased = Chart::with_tempo(TempoCurve::from_points(points, epoch));
    for note in chart.notes() {
        rebased.add_note(note.clone());
    }
    rebased.tempo().validate()?;
    Ok(rebased)
}

/// Stretch a chart onto one tempo, for the fixed-tempo format
///
/// `bpm` defaults to the chart's starting tempo.
pub fn to_fixed_tempo(chart: &Chart, bpm: Option<f64>) -> Result<Chart, ChartError> {
    let bpm = match bpm {
        Some(bpm) => bpm,
        None => chart.tempo().starting_tempo()?,
    };
    debug!("adapting chart to a fixed tempo of {}", bpm);
    let adapted = adapt_timeline(chart, &Destination::Fixed(bpm))?;
    rebase(&adapted, Epoch::Zero)
}

/// Re-express a single-tempo chart at `bpm` under `epoch`
pub fn from_fixed_tempo(chart: &Chart, bpm: f64, epoch: Epoch) -> Result<Chart, ChartError> {
    let adapted = adapt_timeline(chart, &Destination::Fixed(bpm))?;
    rebase(&adapted, epoch)
}
