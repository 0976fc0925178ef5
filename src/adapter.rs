//! # Timeline Adapter
//!
//! Re-expresses a chart authored under one tempo curve in the measures of another.
//!
//! ## Purpose
//! A fixed-tempo format cannot store tempo changes, so a multi-tempo chart must be
//! stretched: each note moves to the position that is reached after the same number
//! of seconds under the destination tempo. Durations and delays that span a tempo
//! change are re-timed segment by segment, so every note still starts and ends at
//! the same real time.
//!
//! ## Algorithm
//! Notes and tempo points are merged into one position-ordered walk. Between two
//! consecutive events the source tempo is constant (the tempo just before the later
//! event), so elapsed seconds accumulate one gap at a time. Tempo points only drive
//! the accumulation; the output chart carries the destination's curve instead.
//!
//! ## Also Here
//! - [`offset_chart`] - Shift a whole chart by measures or seconds
//! - [`quantise`] / [`quantise_chart`] - Snap positions to a rhythmic grid

use crate::error::ChartError;
use crate::note::{Chart, Note};
use crate::time::{Position, TempoCurve, TempoPoint, SECONDS_PER_MEASURE_AT_1_BPM};
use log::debug;
use std::str::FromStr;

/// Tempo regime a chart is adapted into
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    /// A single tempo for the whole chart
    Fixed(f64),
    /// An arbitrary tempo curve
    Curve(TempoCurve),
}

impl Destination {
    fn validate(&self) -> Result<(), ChartError> {
        match self {
            Destination::Fixed(bpm) => TempoPoint::new(Position::ZERO, *bpm).map(|_| ()),
            Destination::Curve(curve) => curve.validate(),
        }
    }

    fn seconds_to_measures(&self, seconds: f64) -> Result<f64, ChartError> {
        match self {
            Destination::Fixed(bpm) => Ok(seconds * bpm / SECONDS_PER_MEASURE_AT_1_BPM),
            Destination::Curve(curve) => curve.seconds_to_measures(seconds),
        }
    }
}

enum Event {
    Tempo(Position),
    Note(usize),
}

impl Event {
    fn position(&self, notes: &[Note]) -> Position {
        match self {
            Event::Tempo(position) => *position,
            Event::Note(index) => notes[*index].position(),
        }
    }
}

/// Move a span's end points into the destination, returning its new length
fn adapt_span(
    source: &TempoCurve,
    destination: &Destination,
    start_seconds: f64,
    start: Position,
    length: Position,
) -> Result<(f64, Position), ChartError> {
    let end_seconds = start_seconds + source.seconds_between(start, start + length)?;
    let from = destination.seconds_to_measures(start_seconds)?;
    let to = destination.seconds_to_measures(end_seconds)?;
    Ok((end_seconds, Position::from_measures(to - from)))
}

/// Re-time every note of `chart` under the `destination` tempo
pub fn adapt_timeline(chart: &Chart, destination: &Destination) -> Result<Chart, ChartError> {
    let source = chart.tempo();
    source.validate()?;
    destination.validate()?;

    let notes = chart.notes();
    let mut events: Vec<Event> = source
        .points()
        .iter()
        .map(|p| Event::Tempo(p.position))
        .chain((0..notes.len()).map(Event::Note))
        .collect();
    events.sort_by_key(|e| e.position(notes));

    let tempo = match destination {
        Destination::Fixed(bpm) => TempoCurve::from_points(
            vec![TempoPoint::new(Position::ZERO, *bpm)?],
            chart.epoch(),
        ),
        Destination::Curve(curve) => curve.clone(),
    };
    let mut adapted = Chart::with_tempo(tempo);

    let mut seconds = 0.0;
    let mut previous = Position::ZERO;
    for event in &events {
        let position = event.position(notes);
        if position > previous {
            let bpm = source.tempo_before(position)?;
            seconds += SECONDS_PER_MEASURE_AT_1_BPM * (position - previous).as_measures() / bpm;
            previous = position;
        }

        let index = match event {
            Event::Tempo(_) => continue,
            Event::Note(index) => *index,
        };
        let start_seconds = if position.is_negative() {
            source.position_to_seconds(position)?
        } else {
            seconds
        };
        let mut note = notes[index].clone();
        note.set_position(Position::from_measures(
            destination.seconds_to_measures(start_seconds)?,
        ));
        match &mut note {
            Note::Tap(_) | Note::TouchTap(_) => {}
            Note::Hold(hold) => {
                hold.duration = adapt_span(source, destination, start_seconds, position, hold.duration)?.1;
            }
            Note::TouchHold(hold) => {
                hold.duration = adapt_span(source, destination, start_seconds, position, hold.duration)?.1;
            }
            Note::Slide(slide) => {
                let (moving_seconds, delay) =
                    adapt_span(source, destination, start_seconds, position, slide.delay)?;
                let (_, duration) = adapt_span(
                    source,
                    destination,
                    moving_seconds,
                    position + slide.delay,
                    slide.duration,
                )?;
                slide.delay = delay;
                slide.duration = duration;
            }
        }
        adapted.add_note(note);
    }

    debug!(
        "adapted {} notes across {} tempo points",
        notes.len(),
        source.points().len()
    );
    Ok(adapted)
}

/// A uniform shift of a chart
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Offset {
    Measures(f64),
    Seconds(f64),
}

impl FromStr for Offset {
    type Err = ChartError;

    /// Accepts `"0.25"` and `"1/4"` as measures, `"1.5s"` as seconds
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ChartError::Config(format!("Invalid offset: {}", s));

        if let Some(seconds) = s.strip_suffix(['s', 'S']) {
            let seconds: f64 = seconds.trim().parse().map_err(|_| invalid())?;
            return Ok(Offset::Seconds(seconds));
        }
        if let Some((numerator, denominator)) = s.split_once('/') {
            let numerator: i64 = numerator.trim().parse().map_err(|_| invalid())?;
            let denominator: i64 = denominator.trim().parse().map_err(|_| invalid())?;
            if denominator == 0 {
                return Err(invalid());
            }
            return Ok(Offset::Measures(numerator as f64 / denominator as f64));
        }
        s.parse().map(Offset::Measures).map_err(|_| invalid())
    }
}

/// Shift every note and tempo change of `chart` by `offset`
///
/// Tempo changes inside the lead-in measures `[0, 1]` stay where they are, so the
/// chart keeps a starting tempo.
pub fn offset_chart(chart: &Chart, offset: Offset) -> Result<Chart, ChartError> {
    let delta = match offset {
        Offset::Measures(measures) => Position::from_measures(measures),
        Offset::Seconds(seconds) => {
            Position::from_measures(chart.tempo().seconds_to_measures(seconds)?)
        }
    };

    let lead_in = Position::ZERO..=Position::ONE;
    let points = chart
        .tempo()
        .points()
        .iter()
        .map(|p| {
            if lead_in.contains(&p.position) {
                *p
            } else {
                TempoPoint {
                    position: p.position + delta,
                    bpm: p.bpm,
                }
            }
        })
        .collect();
    let mut shifted = Chart::with_tempo(TempoCurve::from_points(points, chart.epoch()));

    for note in chart.notes() {
        let position = note.position() + delta;
        if position.is_negative() {
            return Err(ChartError::invalid_note(
                position.as_measures(),
                "offset moves note before measure 0",
            ));
        }
        let mut note = note.clone();
        note.set_position(position);
        shifted.add_note(note);
    }
    debug!("offset {} notes by {} measures", shifted.notes().len(), delta);
    Ok(shifted)
}

/// Snap a position to the nearest multiple of `1 / grid` measures
pub fn quantise(position: Position, grid: u32) -> Result<Position, ChartError> {
    if grid == 0 {
        return Err(ChartError::Config("Quantisation grid must be positive".to_string()));
    }
    let grid = grid as f64;
    Ok(Position::from_measures(
        (position.as_measures() * grid).round() / grid,
    ))
}

/// Snap every note start, duration and delay plus every tempo change to the grid
pub fn quantise_chart(chart: &Chart, grid: u32) -> Result<Chart, ChartError> {
    let points = chart
        .tempo()
        .points()
        .iter()
        .map(|p| {
            Ok(TempoPoint {
                position: quantise(p.position, grid)?,
                bpm: p.bpm,
            })
        })
        .collect::<Result<Vec<_>, ChartError>>()?;
    let mut snapped = Chart::with_tempo(TempoCurve::from_points(points, chart.epoch()));

    for note in chart.notes() {
        let mut note = note.clone();
        note.set_position(quantise(note.position(), grid)?);
        match &mut note {
            Note::Tap(_) | Note::TouchTap(_) => {}
            Note::Hold(hold) => hold.duration = quantise(hold.duration, grid)?,
            Note::TouchHold(hold) => hold.duration = quantise(hold.duration, grid)?,
            Note::Slide(slide) => {
                slide.duration = quantise(slide.duration, grid)?;
                slide.delay = quantise(slide.delay, grid)?;
            }
        }
        snapped.add_note(note);
    }
    Ok(snapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::{Hold, Lane, Slide, SlidePattern, Tap};
    use crate::time::Epoch;

    fn at(m: f64) -> Position {
        Position::from_measures(m)
    }

    fn lane(i: u8) -> Lane {
        Lane::new(i).unwrap()
    }

    fn chart_with_tempo(points: &[(f64, f64)], epoch: Epoch) -> Chart {
        let mut chart = Chart::new(epoch);
        for &(m, bpm) in points {
            chart.set_tempo(at(m), bpm).unwrap();
        }
        chart
    }

    #[test]
    fn test_hold_across_tempo_change() {
        let mut chart = chart_with_tempo(&[(0.0, 120.0), (1.0, 240.0)], Epoch::Zero);
        chart.add_hold(Hold::new(at(0.0), lane(0), at(2.0)).unwrap());

        let adapted = adapt_timeline(&chart, &Destination::Fixed(120.0)).unwrap();
        match &adapted.notes()[0] {
            Note::Hold(hold) => {
                assert_eq!(hold.position, at(0.0));
                assert_eq!(hold.duration, at(1.5));
            }
            _ => panic!("Expected Hold"),
        }
        assert_eq!(adapted.tempo().points().len(), 1);
    }

    #[test]
    fn test_note_positions_follow_elapsed_time() {
        let mut chart = chart_with_tempo(&[(0.0, 120.0), (2.0, 60.0)], Epoch::Zero);
        chart.add_tap(Tap::new(at(3.0), lane(4)).unwrap());

        // 2 measures at 120 (4s) then 1 measure at 60 (4s): 8s at 120 is 4 measures
        let adapted = adapt_timeline(&chart, &Destination::Fixed(120.0)).unwrap();
        assert_eq!(adapted.notes()[0].position(), at(4.0));
    }

    #[test]
    fn test_tap_on_tempo_boundary() {
        let mut chart = chart_with_tempo(&[(0.0, 120.0), (1.0, 240.0)], Epoch::Zero);
        chart.add_tap(Tap::new(at(1.0), lane(0)).unwrap());
        let adapted = adapt_timeline(&chart, &Destination::Fixed(240.0)).unwrap();
        assert_eq!(adapted.notes()[0].position(), at(2.0));
    }

    #[test]
    fn test_slide_delay_and_duration_adapt_separately() {
        let mut chart = chart_with_tempo(&[(0.0, 120.0), (1.25, 60.0)], Epoch::Zero);
        chart.add_slide(
            Slide::new(at(1.0), lane(0), lane(4), SlidePattern::STRAIGHT, at(0.5), at(0.25))
                .unwrap(),
        );

        let adapted = adapt_timeline(&chart, &Destination::Fixed(120.0)).unwrap();
        match &adapted.notes()[0] {
            Note::Slide(slide) => {
                assert_eq!(slide.position, at(1.0));
                assert_eq!(slide.delay, at(0.25));
                assert_eq!(slide.duration, at(1.0));
            }
            _ => panic!("Expected Slide"),
        }
    }

    #[test]
    fn test_adapt_into_curve_round_trips() {
        let mut chart = chart_with_tempo(&[(0.0, 150.0), (2.0, 200.0), (3.5, 100.0)], Epoch::Zero);
        chart.add_hold(Hold::new(at(1.5), lane(2), at(2.5)).unwrap());
        chart.add_tap(Tap::new(at(3.75), lane(6)).unwrap());

        let fixed = adapt_timeline(&chart, &Destination::Fixed(150.0)).unwrap();
        let back = adapt_timeline(&fixed, &Destination::Curve(chart.tempo().clone())).unwrap();
        for (original, restored) in chart.sorted_notes().iter().zip(back.sorted_notes()) {
            assert!(original.position().approx_eq(restored.position()));
            assert!(original.end_position().approx_eq(restored.end_position()));
        }
    }

    #[test]
    fn test_adapt_requires_tempo() {
        let mut chart = Chart::new(Epoch::Zero);
        chart.add_tap(Tap::new(at(1.0), lane(0)).unwrap());
        assert!(matches!(
            adapt_timeline(&chart, &Destination::Fixed(120.0)),
            Err(ChartError::MissingTempoCurve)
        ));
        let chart = chart_with_tempo(&[(0.0, 120.0)], Epoch::Zero);
        assert!(adapt_timeline(&chart, &Destination::Fixed(0.0)).is_err());
    }

    #[test]
    fn test_parse_offsets() {
        assert_eq!("0.5".parse::<Offset>().unwrap(), Offset::Measures(0.5));
        assert_eq!("1/4".parse::<Offset>().unwrap(), Offset::Measures(0.25));
        assert_eq!("-1.5s".parse::<Offset>().unwrap(), Offset::Seconds(-1.5));
        assert!("1/0".parse::<Offset>().is_err());
        assert!("abc".parse::<Offset>().is_err());
    }

    #[test]
    fn test_offset_keeps_lead_in_tempo() {
        let mut chart = chart_with_tempo(&[(1.0, 120.0), (3.0, 180.0)], Epoch::One);
        chart.add_tap(Tap::new(at(2.0), lane(0)).unwrap());

        let shifted = offset_chart(&chart, Offset::Measures(0.5)).unwrap();
        let positions: Vec<Position> = shifted.tempo().points().iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![at(1.0), at(3.5)]);
        assert_eq!(shifted.notes()[0].position(), at(2.5));
    }

    #[test]
    fn test_offset_in_seconds() {
        let mut chart = chart_with_tempo(&[(0.0, 120.0)], Epoch::Zero);
        chart.add_tap(Tap::new(at(2.0), lane(0)).unwrap());
        let shifted = offset_chart(&chart, Offset::Seconds(1.0)).unwrap();
        assert_eq!(shifted.notes()[0].position(), at(2.5));
    }

    #[test]
    fn test_offset_before_start_rejected() {
        let mut chart = chart_with_tempo(&[(0.0, 120.0)], Epoch::Zero);
        chart.add_tap(Tap::new(at(0.25), lane(0)).unwrap());
        assert!(offset_chart(&chart, Offset::Measures(-0.5)).is_err());
    }

    #[test]
    fn test_quantise() {
        assert_eq!(quantise(at(1.2501), 16).unwrap(), at(1.25));
        assert_eq!(quantise(at(1.33), 3).unwrap(), Position::from_units(13_333));
        assert!(matches!(quantise(at(1.0), 0), Err(ChartError::Config(_))));
    }

    #[test]
    fn test_quantise_chart_snaps_lengths() {
        let mut chart = chart_with_tempo(&[(0.0, 120.0)], Epoch::Zero);
        chart.add_hold(Hold::new(at(1.0624), lane(0), at(0.4999)).unwrap());
        let snapped = quantise_chart(&chart, 16).unwrap();
        match &snapped.notes()[0] {
            Note::Hold(hold) => {
                assert_eq!(hold.position, at(1.0625));
                assert_eq!(hold.duration, at(0.5));
            }
            _ => panic!("Expected Hold"),
        }
    }
}
