//! # Fixed-Tempo Format
//!
//! Comma-separated records in measures, all under one tempo that the file itself
//! does not store. Each record has seven to nine columns:
//!
//! ```text
//! whole, fraction, duration, lane, type, slide id, pattern[, amount][, delay]
//! ```
//!
//! | type | note |
//! |------|------|
//! | 0 | slide start |
//! | 1 | tap |
//! | 2 | hold |
//! | 3 | break tap |
//! | 4 | star |
//! | 5 | break star |
//! | 128 | slide end |
//!
//! A slide is split into a start record on its start lane and an end record on
//! its end lane, sharing a slide id. The start record's duration *includes* the
//! delay; [`Slide`] keeps them apart, so both directions convert at this boundary.
//! A star's `amount` is the number of slides it launches.

use super::field;
use crate::error::{ChartError, Location};
use crate::note::{
    Chart, Hold, Lane, Note, Slide, SlidePattern, Tap, TouchZone, DEFAULT_SLIDE_DELAY,
};
use crate::time::{Epoch, Position, TempoCurve};
use log::{debug, warn};
use std::collections::HashMap;

/// Duration written for records that have none
const TAP_DURATION: f64 = 0.0625;

const SLIDE_START: u32 = 0;
const TAP: u32 = 1;
const HOLD: u32 = 2;
const BREAK: u32 = 3;
const STAR: u32 = 4;
const BREAK_STAR: u32 = 5;
const SLIDE_END: u32 = 128;

#[derive(Debug, Clone, Copy, Default)]
pub struct SdtOptions {
    /// Map touch notes onto lane taps and holds instead of dropping them
    pub convert_touch: bool,
}

struct PendingSlide {
    position: Position,
    lane: Lane,
    pattern: SlidePattern,
    total: Position,
    delay: Position,
}

fn split_record(line: &str) -> Vec<String> {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .trim_end_matches(',')
        .split(',')
        .map(str::to_string)
        .collect()
}

fn read_record(
    values: &[&str],
    chart: &mut Chart,
    pending: &mut HashMap<u32, PendingSlide>,
) -> Result<(), ChartError> {
    if !(7..=9).contains(&values.len()) {
        return Err(ChartError::malformed(format!(
            "record has {} columns, expected 7 to 9",
            values.len()
        )));
    }

    let whole: f64 = field(values, 0, "measure")?;
    let fraction: f64 = field(values, 1, "fraction")?;
    let duration: f64 = field(values, 2, "duration")?;
    let position = Position::from_measures(whole + fraction);
    let lane = Lane::new(field(values, 3, "lane")?)?;
    let kind: u32 = field(values, 4, "note type")?;

    match kind {
        TAP | BREAK | STAR | BREAK_STAR => {
            let tap = Tap::new(position, lane)?;
            chart.add_tap(Tap {
                is_break: matches!(kind, BREAK | BREAK_STAR),
                is_star: matches!(kind, STAR | BREAK_STAR),
                ..tap
            });
        }
        HOLD => {
            chart.add_hold(Hold::new(position, lane, Position::from_measures(duration))?);
        }
        SLIDE_START => {
            let slide_id: u32 = field(values, 5, "slide id")?;
            let pattern = SlidePattern::new(field(values, 6, "slide pattern")?)?;
            let delay = if values.len() == 9 {
                Position::from_measures(field(values, 8, "slide delay")?)
            } else {
                Position::from_measures(DEFAULT_SLIDE_DELAY)
            };
            pending.insert(
                slide_id,
                PendingSlide {
                    position,
                    lane,
                    pattern,
                    total: Position::from_measures(duration),
                    delay,
                },
            );
        }
        SLIDE_END => {
            let slide_id: u32 = field(values, 5, "slide id")?;
            let start = pending
                .remove(&slide_id)
                .ok_or(ChartError::UnresolvedSlidePair { slide_id })?;
            chart.add_slide(Slide::new(
                start.position,
                start.lane,
                lane,
                start.pattern,
                start.total - start.delay,
                start.delay,
            )?);
        }
        other => {
            return Err(ChartError::malformed(format!("unknown note type {}", other)));
        }
    }
    Ok(())
}

/// Build a chart from fixed-tempo lines played at `bpm`
pub fn parse_records<'a, I>(lines: I, bpm: f64) -> Result<Chart, ChartError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut chart = Chart::with_tempo(TempoCurve::constant(bpm, Epoch::Zero)?);
    let mut pending: HashMap<u32, PendingSlide> = HashMap::new();

    for (index, line) in lines.into_iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let owned = split_record(line);
        let values: Vec<&str> = owned.iter().map(String::as_str).collect();
        read_record(&values, &mut chart, &mut pending)
            .map_err(|e| e.at(Location::Line(index + 1)))?;
    }

    if !pending.is_empty() {
        let mut ids: Vec<u32> = pending.into_keys().collect();
        ids.sort_unstable();
        warn!("dropping slides with no end record: {:?}", ids);
    }
    debug!("read {} notes", chart.notes().len());
    Ok(chart)
}

struct Record {
    position: Position,
    duration: f64,
    lane: u8,
    kind: u32,
    slide_id: u32,
    pattern: u8,
    amount: usize,
    delay: f64,
}

impl Record {
    fn note(position: Position, lane: Lane, kind: u32) -> Self {
        Self {
            position,
            duration: TAP_DURATION,
            lane: lane.index(),
            kind,
            slide_id: 0,
            pattern: 0,
            amount: 0,
            delay: 0.0,
        }
    }

    fn hold(position: Position, lane: Lane, duration: Position) -> Self {
        Self {
            duration: duration.as_measures(),
            ..Self::note(position, lane, HOLD)
        }
    }

    fn render(&self) -> String {
        let units = self.position.units();
        let whole = units.div_euclid(Position::UNITS_PER_MEASURE) as f64;
        let fraction =
            units.rem_euclid(Position::UNITS_PER_MEASURE) as f64 / Position::UNITS_PER_MEASURE as f64;
        format!(
            "{:.4}, {:.4}, {:.4}, {:2}, {:3}, {:3}, {:2}, {:2}, {:.4},",
            whole,
            fraction,
            self.duration,
            self.lane,
            self.kind,
            self.slide_id,
            self.pattern,
            self.amount,
            self.delay
        )
    }
}

fn touch_record(note: &Note) -> Option<Record> {
    match note {
        Note::TouchTap(touch) if touch.zone == TouchZone::C => {
            Some(Record::note(touch.position, Lane::new(0).ok()?, TAP))
        }
        Note::TouchTap(touch) => Some(Record::note(touch.position, Lane::new(touch.lane).ok()?, TAP)),
        Note::TouchHold(touch) if touch.zone == TouchZone::C => Some(Record::hold(
            touch.position,
            Lane::new(0).ok()?,
            touch.duration,
        )),
        _ => None,
    }
}

/// Write a fixed-tempo chart as records
///
/// The chart must hold at most one tempo; adapt multi-tempo charts first.
pub fn render_records(chart: &Chart, options: SdtOptions) -> Result<Vec<String>, ChartError> {
    if chart.tempo().points().len() > 1 {
        return Err(ChartError::malformed(
            "the fixed-tempo format cannot store tempo changes",
        ));
    }

    let mut records: Vec<Record> = Vec::new();
    let mut slide_id = 0;
    let mut dropped = 0;

    for note in chart.sorted_notes() {
        match note {
            Note::Tap(tap) => {
                let kind = match (tap.is_break, tap.is_star) {
                    (true, true) => BREAK_STAR,
                    (true, false) => BREAK,
                    (false, true) => STAR,
                    (false, false) => TAP,
                };
                let amount = if tap.is_star {
                    chart.slide_count(tap.position, tap.lane)
                } else {
                    0
                };
                records.push(Record {
                    amount,
                    ..Record::note(tap.position, tap.lane, kind)
                });
            }
            Note::Hold(hold) => records.push(Record::hold(hold.position, hold.lane, hold.duration)),
            Note::Slide(slide) => {
                slide_id += 1;
                let total = slide.delay + slide.duration;
                records.push(Record {
                    duration: total.as_measures(),
                    slide_id,
                    pattern: slide.pattern.id(),
                    delay: slide.delay.as_measures(),
                    ..Record::note(slide.position, slide.start_lane, SLIDE_START)
                });
                records.push(Record {
                    duration: 0.0,
                    slide_id,
                    pattern: slide.pattern.id(),
                    ..Record::note(slide.position + total, slide.end_lane, SLIDE_END)
                });
            }
            Note::TouchTap(_) | Note::TouchHold(_) => {
                match touch_record(note).filter(|_| options.convert_touch) {
                    Some(record) => records.push(record),
                    None => dropped += 1,
                }
            }
        }
    }

    if dropped > 0 {
        warn!("skipped {} touch note(s)", dropped);
    }
    records.sort_by_key(|r| r.position);
    Ok(records.iter().map(Record::render).collect())
}
