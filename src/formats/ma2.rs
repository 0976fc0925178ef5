//! # Tick Format
//!
//! Tab-separated records placing events at `measure, tick` with a fixed number of
//! ticks per measure (the resolution). Tempo changes are `BPM` records and may
//! appear anywhere, so the chart keeps its full tempo curve. The first tempo must
//! be at measure 0.
//!
//! ## Records
//! ```text
//! BPM   measure tick bpm
//! MET   measure tick numerator denominator
//! TAP   measure tick lane                      (BRK XTP STR BST XST alike)
//! HLD   measure tick lane duration             (XHO alike)
//! TTP   measure tick sensor zone firework size
//! THO   measure tick sensor duration zone firework size
//! SI_   measure tick start delay duration end  (one record type per pattern)
//! ```
//! Slide durations exclude the delay, as in [`Slide`].

use super::field;
use crate::error::{ChartError, Location};
use crate::note::{Chart, Hold, Lane, Note, Slide, SlidePattern, Tap, TouchHold, TouchTap, TouchZone};
use crate::time::{Epoch, Position};
use log::{debug, warn};
use std::collections::HashMap;

pub const DEFAULT_RESOLUTION: u32 = 384;

const VERSION: &str = "1.03.00";

/// Slide record names, indexed by pattern id minus one
const SLIDE_RECORDS: [&str; 13] = [
    "SI_", "SCL", "SCR", "SUL", "SUR", "SSL", "SSR", "SV_", "SXL", "SXR", "SLL", "SLR", "SF_",
];

/// Header and statistics records carry nothing a chart needs
const IGNORED_RECORDS: &[&str] = &[
    "VERSION", "FES_MODE", "BPM_DEF", "MET_DEF", "CLK_DEF", "CLK", "COMPATIBLE_CODE",
    "T_REC_TAP", "T_REC_BRK", "T_REC_XTP", "T_REC_HLD", "T_REC_XHO", "T_REC_STR",
    "T_REC_BST", "T_REC_XST", "T_REC_TTP", "T_REC_THO", "T_REC_SLD", "T_REC_ALL",
    "T_NUM_TAP", "T_NUM_BRK", "T_NUM_HLD", "T_NUM_SLD", "T_NUM_ALL", "T_JUDGE_TAP",
    "T_JUDGE_HLD", "T_JUDGE_SLD", "T_JUDGE_ALL", "TTM_EACHPAIRS", "TTM_SCR_TAP",
    "TTM_SCR_BRK", "TTM_SCR_HLD", "TTM_SCR_SLD", "TTM_SCR_ALL", "TTM_SCR_S", "TTM_SCR_SS",
    "TTM_RAT_ACV",
];

const TOUCH_SIZES: &[&str] = &["M1", "L1"];

fn slide_pattern(record: &str) -> Option<SlidePattern> {
    SLIDE_RECORDS
        .iter()
        .position(|name| *name == record)
        .and_then(|index| SlidePattern::new(index as u8 + 1).ok())
}

fn slide_record(pattern: SlidePattern) -> &'static str {
    SLIDE_RECORDS[pattern.id() as usize - 1]
}

struct Reader {
    resolution: u32,
    chart: Chart,
}

impl Reader {
    fn position(&self, values: &[&str]) -> Result<Position, ChartError> {
        let measure: i64 = field(values, 1, "measure")?;
        let tick: i64 = field(values, 2, "tick")?;
        Ok(Position::from_measures(
            measure as f64 + tick as f64 / self.resolution as f64,
        ))
    }

    fn length(&self, values: &[&str], index: usize, name: &str) -> Result<Position, ChartError> {
        let ticks: i64 = field(values, index, name)?;
        Ok(Position::from_measures(ticks as f64 / self.resolution as f64))
    }

    fn lane(&self, values: &[&str], index: usize) -> Result<Lane, ChartError> {
        Lane::new(field(values, index, "lane")?)
    }

    fn touch_zone(values: &[&str], index: usize) -> Result<TouchZone, ChartError> {
        let raw: String = field(values, index, "touch zone")?;
        let mut letters = raw.chars();
        match (letters.next().and_then(TouchZone::from_letter), letters.next()) {
            (Some(zone), None) => Ok(zone),
            _ => Err(ChartError::malformed(format!("`{}` is not a touch zone", raw))),
        }
    }

    fn check_size(values: &[&str], index: usize) {
        if let Some(size) = values.get(index) {
            if !TOUCH_SIZES.contains(size) {
                warn!("ignoring unknown touch size `{}`", size);
            }
        }
    }

    fn record(&mut self, values: &[&str]) -> Result<(), ChartError> {
        let kind = values[0];
        match kind {
            _ if IGNORED_RECORDS.contains(&kind) => {}
            "RESOLUTION" => {
                let resolution: u32 = field(values, 1, "resolution")?;
                if resolution == 0 {
                    return Err(ChartError::malformed("resolution must be positive"));
                }
                self.resolution = resolution;
            }
            "BPM" => {
                let position = self.position(values)?;
                let bpm: f64 = field(values, 3, "tempo")?;
                self.chart.set_tempo(position, bpm)?;
            }
            "MET" => {
                let numerator: u32 = field(values, 3, "meter numerator")?;
                let denominator: u32 = field(values, 4, "meter denominator")?;
                if numerator == 0 || denominator == 0 {
                    return Err(ChartError::malformed("meter must be positive"));
                }
                debug!("meter {}/{} at {}", numerator, denominator, self.position(values)?);
            }
            "TAP" | "BRK" | "XTP" | "STR" | "BST" | "XST" => {
                let tap = Tap::new(self.position(values)?, self.lane(values, 3)?)?;
                self.chart.add_tap(Tap {
                    is_break: matches!(kind, "BRK" | "BST"),
                    is_star: matches!(kind, "STR" | "BST" | "XST"),
                    is_ex: matches!(kind, "XTP" | "XST"),
                    ..tap
                });
            }
            "HLD" | "XHO" => {
                let hold = Hold::new(
                    self.position(values)?,
                    self.lane(values, 3)?,
                    self.length(values, 4, "hold duration")?,
                )?;
                self.chart.add_hold(Hold {
                    is_ex: kind == "XHO",
                    ..hold
                });
            }
            "TTP" => {
                let touch = TouchTap::new(
                    self.position(values)?,
                    Self::touch_zone(values, 4)?,
                    field(values, 3, "sensor")?,
                )?;
                let firework: u8 = field(values, 5, "firework flag")?;
                Self::check_size(values, 6);
                self.chart.add_touch_tap(TouchTap {
                    is_firework: firework == 1,
                    ..touch
                });
            }
            "THO" => {
                let touch = TouchHold::new(
                    self.position(values)?,
                    Self::touch_zone(values, 5)?,
                    field(values, 3, "sensor")?,
                    self.length(values, 4, "touch hold duration")?,
                )?;
                let firework: u8 = field(values, 6, "firework flag")?;
                Self::check_size(values, 7);
                self.chart.add_touch_hold(TouchHold {
                    is_firework: firework == 1,
                    ..touch
                });
            }
            _ => match slide_pattern(kind) {
                Some(pattern) => {
                    let slide = Slide::new(
                        self.position(values)?,
                        self.lane(values, 3)?,
                        self.lane(values, 6)?,
                        pattern,
                        self.length(values, 5, "slide duration")?,
                        self.length(values, 4, "slide delay")?,
                    )?;
                    self.chart.add_slide(slide);
                }
                None => warn!("ignoring unknown record type `{}`", kind),
            },
        }
        Ok(())
    }
}

/// Build a chart from tick format lines
pub fn parse_records<'a, I>(lines: I) -> Result<Chart, ChartError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut reader = Reader {
        resolution: DEFAULT_RESOLUTION,
        chart: Chart::new(Epoch::Zero),
    };

    for (index, line) in lines.into_iter().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let values: Vec<&str> = line.split('\t').collect();
        reader
            .record(&values)
            .map_err(|e| e.at(Location::Line(index + 1)))?;
    }

    let chart = reader.chart;
    if !chart.notes().is_empty() || !chart.tempo().is_empty() {
        chart.tempo().validate()?;
    }
    debug!(
        "read {} notes and {} tempo changes",
        chart.notes().len(),
        chart.tempo().points().len()
    );
    Ok(chart)
}

fn ticks(position: Position, resolution: u32) -> (i64, i64) {
    let resolution = resolution as i64;
    let total = (position.as_measures() * resolution as f64).round() as i64;
    (total.div_euclid(resolution), total.rem_euclid(resolution))
}

fn length_ticks(length: Position, resolution: u32) -> i64 {
    (length.as_measures() * resolution as f64).round() as i64
}

fn tap_record(tap: &Tap) -> &'static str {
    match (tap.is_ex, tap.is_break, tap.is_star) {
        (true, _, true) => "XST",
        (true, _, false) => "XTP",
        (false, true, true) => "BST",
        (false, true, false) => "BRK",
        (false, false, true) => "STR",
        (false, false, false) => "TAP",
    }
}

fn note_record(note: &Note, resolution: u32) -> (&'static str, String) {
    let (measure, tick) = ticks(note.position(), resolution);
    match note {
        Note::Tap(tap) => {
            let kind = tap_record(tap);
            (kind, format!("{}\t{}\t{}\t{}", kind, measure, tick, tap.lane.index()))
        }
        Note::Hold(hold) => {
            let kind = if hold.is_ex { "XHO" } else { "HLD" };
            let record = format!(
                "{}\t{}\t{}\t{}\t{}",
                kind,
                measure,
                tick,
                hold.lane.index(),
                length_ticks(hold.duration, resolution)
            );
            (kind, record)
        }
        Note::Slide(slide) => {
            let record = format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                slide_record(slide.pattern),
                measure,
                tick,
                slide.start_lane.index(),
                length_ticks(slide.delay, resolution),
                length_ticks(slide.duration, resolution),
                slide.end_lane.index()
            );
            ("SLD", record)
        }
        Note::TouchTap(touch) => {
            let record = format!(
                "TTP\t{}\t{}\t{}\t{}\t{}\tM1",
                measure,
                tick,
                touch.lane,
                touch.zone.letter(),
                touch.is_firework as u8
            );
            ("TTP", record)
        }
        Note::TouchHold(touch) => {
            let record = format!(
                "THO\t{}\t{}\t{}\t{}\t{}\t{}\tM1",
                measure,
                tick,
                touch.lane,
                length_ticks(touch.duration, resolution),
                touch.zone.letter(),
                touch.is_firework as u8
            );
            ("THO", record)
        }
    }
}

const STAT_KINDS: [&str; 11] = [
    "TAP", "BRK", "XTP", "HLD", "XHO", "STR", "BST", "XST", "TTP", "THO", "SLD",
];

fn epilogue(stats: &HashMap<&str, u64>, each_pairs: u64) -> Vec<String> {
    let count = |kinds: &[&str]| kinds.iter().map(|k| stats.get(k).copied().unwrap_or(0)).sum::<u64>();
    let mut lines = Vec::new();

    let total = count(&STAT_KINDS);
    for kind in STAT_KINDS {
        lines.push(format!("T_REC_{}\t{}", kind, count(&[kind])));
    }
    lines.push(format!("T_REC_ALL\t{}", total));

    let taps = count(&["TAP", "XTP", "STR", "XST", "TTP"]);
    let breaks = count(&["BRK", "BST"]);
    let holds = count(&["HLD", "XHO", "THO"]);
    let slides = count(&["SLD"]);
    lines.push(format!("T_NUM_TAP\t{}", taps));
    lines.push(format!("T_NUM_BRK\t{}", breaks));
    lines.push(format!("T_NUM_HLD\t{}", holds));
    lines.push(format!("T_NUM_SLD\t{}", slides));
    lines.push(format!("T_NUM_ALL\t{}", total));

    let judge_holds = (holds as f64 * 1.75).round() as u64;
    lines.push(format!("T_JUDGE_TAP\t{}", taps + breaks));
    lines.push(format!("T_JUDGE_HLD\t{}", judge_holds));
    lines.push(format!("T_JUDGE_SLD\t{}", slides));
    lines.push(format!("T_JUDGE_ALL\t{}", taps + breaks + judge_holds + slides));
    lines.push(format!("TTM_EACHPAIRS\t{}", each_pairs));

    let (tap_score, break_score) = (500 * taps, 2600 * breaks);
    let (hold_score, slide_score) = (1000 * holds, 1500 * slides);
    let max_score = tap_score + break_score + hold_score + slide_score;
    let base_score = tap_score + hold_score + slide_score + 2500 * breaks;
    lines.push(format!("TTM_SCR_TAP\t{}", tap_score));
    lines.push(format!("TTM_SCR_BRK\t{}", break_score));
    lines.push(format!("TTM_SCR_HLD\t{}", hold_score));
    lines.push(format!("TTM_SCR_SLD\t{}", slide_score));
    lines.push(format!("TTM_SCR_ALL\t{}", max_score));
    lines.push(format!(
        "TTM_SCR_S\t{}",
        (0.97 * base_score as f64 / 100.0).round() as u64 * 100
    ));
    lines.push(format!("TTM_SCR_SS\t{}", base_score));
    let achievement = if base_score == 0 {
        0
    } else {
        10_000 * max_score / base_score
    };
    lines.push(format!("TTM_RAT_ACV\t{}", achievement));
    lines
}

/// Write a chart as tick format lines at `resolution` ticks per measure
///
/// Meter is not tracked by [`Chart`], so the output is always in 4/4.
pub fn render_records(chart: &Chart, resolution: u32) -> Result<Vec<String>, ChartError> {
    if resolution == 0 {
        return Err(ChartError::Config("resolution must be positive".to_string()));
    }
    let tempo = chart.tempo();
    let mut curve = tempo.clone();
    curve.set_epoch(Epoch::Zero);
    curve.validate()?;

    let (low, high) = curve.tempo_range()?;
    let starting = curve.starting_tempo()?;
    let dominant = curve.dominant_tempo(chart.end_position())?;

    let mut lines = vec![
        format!("VERSION\t0.00.00\t{}", VERSION),
        "FES_MODE\t0".to_string(),
        format!(
            "BPM_DEF\t{:.3}\t{:.3}\t{:.3}\t{:.3}",
            starting, dominant, high, low
        ),
        "MET_DEF\t4\t4".to_string(),
        format!("RESOLUTION\t{}", resolution),
        format!("CLK_DEF\t{}", resolution),
        "COMPATIBLE_CODE\tMA2".to_string(),
        String::new(),
    ];

    for point in curve.points() {
        let (measure, tick) = ticks(point.position, resolution);
        lines.push(format!("BPM\t{}\t{}\t{:.3}", measure, tick, point.bpm));
    }
    lines.push("MET\t0\t0\t4\t4".to_string());
    lines.push(String::new());

    let mut stats: HashMap<&str, u64> = HashMap::new();
    let mut simultaneous: HashMap<Position, u64> = HashMap::new();
    for note in chart.sorted_notes() {
        let (kind, record) = note_record(note, resolution);
        *stats.entry(kind).or_default() += 1;
        if !matches!(note, Note::Slide(_)) {
            *simultaneous.entry(note.position()).or_default() += 1;
        }
        lines.push(record);
    }
    let each_pairs = simultaneous.values().filter(|count| **count > 1).count() as u64;

    lines.push(String::new());
    lines.extend(epilogue(&stats, each_pairs));
    debug!("wrote {} records at resolution {}", lines.len(), resolution);
    Ok(lines)
}
