//! # Time Module
//!
//! Chart positions and the piecewise-constant tempo curve that maps them to real time.
//!
//! ## Purpose
//! Every chart format places notes on a timeline measured in measures (bars). Real
//! elapsed time depends on the tempo curve: a measure always holds four beats, so a
//! segment of `Δ` measures at `bpm` lasts `240 × Δ / bpm` seconds.
//!
//! ## Positions
//! [`Position`] stores measures as an integer count of ten-thousandths. This gives
//! exact ordering and hashing, and keeps repeated additions from drifting. Two
//! positions are considered simultaneous when they differ by at most one unit.
//!
//! ## Epochs
//! Formats disagree about where a chart starts. Tick formats place their first
//! tempo at measure 0, while the DSL starts playing at measure 1 after a one-measure
//! metronome lead-in. [`Epoch`] records which convention a curve follows; the
//! starting tempo must be defined at or before that position. Elapsed time is always
//! counted from measure 0 so that charts in either convention agree.
//!
//! ## Boundary Rule
//! The interval ending exactly at a tempo change is timed with the tempo in effect
//! *before* the change. A change never alters time that has already elapsed.
//!
//! ## Related Modules
//! - `adapter` - Re-projects notes between tempo curves
//! - `dsl::serializer` - Looks up the tempo for each emitted fragment

use crate::error::ChartError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Seconds in one measure at one beat per minute (four beats per measure)
pub const SECONDS_PER_MEASURE_AT_1_BPM: f64 = 240.0;

/// Position on the chart timeline, in ten-thousandths of a measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Position(i64);

impl Position {
    pub const UNITS_PER_MEASURE: i64 = 10_000;
    pub const ZERO: Position = Position(0);
    pub const ONE: Position = Position(Self::UNITS_PER_MEASURE);

    pub fn from_measures(measures: f64) -> Self {
        Position((measures * Self::UNITS_PER_MEASURE as f64).round() as i64)
    }

    pub const fn from_units(units: i64) -> Self {
        Position(units)
    }

    pub fn as_measures(self) -> f64 {
        self.0 as f64 / Self::UNITS_PER_MEASURE as f64
    }

    pub fn units(self) -> i64 {
        self.0
    }

    /// Whole measure this position falls in
    pub fn whole(self) -> i64 {
        self.0.div_euclid(Self::UNITS_PER_MEASURE)
    }

    /// Epsilon equality: positions at most one unit apart are simultaneous
    pub fn approx_eq(self, other: Position) -> bool {
        (self.0 - other.0).abs() <= 1
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl From<f64> for Position {
    fn from(measures: f64) -> Self {
        Position::from_measures(measures)
    }
}

impl From<Position> for f64 {
    fn from(position: Position) -> Self {
        position.as_measures()
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position(self.0 + rhs.0)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position(self.0 - rhs.0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_measures())
    }
}

/// Where a format's timeline starts playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Epoch {
    /// Tick formats: playback starts at measure 0
    #[default]
    Zero,
    /// DSL: measure 0 is a metronome lead-in, notes start at measure 1
    One,
}

impl Epoch {
    pub fn position(self) -> Position {
        match self {
            Epoch::Zero => Position::ZERO,
            Epoch::One => Position::ONE,
        }
    }
}

/// A tempo change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoPoint {
    pub position: Position,
    pub bpm: f64,
}

impl TempoPoint {
    pub fn new(position: Position, bpm: f64) -> Result<Self, ChartError> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(ChartError::invalid_note(
                position.as_measures(),
                format!("tempo must be positive, got {}", bpm),
            ));
        }
        Ok(Self { position, bpm })
    }
}

/// Ordered, position-unique set of tempo points
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TempoCurve {
    points: Vec<TempoPoint>,
    epoch: Epoch,
}

fn segment_seconds(length: f64, bpm: f64) -> f64 {
    SECONDS_PER_MEASURE_AT_1_BPM * length / bpm
}

impl TempoCurve {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            points: Vec::new(),
            epoch,
        }
    }

    /// A curve holding a single tempo from the epoch onwards
    pub fn constant(bpm: f64, epoch: Epoch) -> Result<Self, ChartError> {
        let mut curve = Self::new(epoch);
        curve.insert(TempoPoint::new(epoch.position(), bpm)?);
        Ok(curve)
    }

    pub fn from_points(points: Vec<TempoPoint>, epoch: Epoch) -> Self {
        let mut curve = Self::new(epoch);
        for point in points {
            curve.insert(point);
        }
        curve
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn set_epoch(&mut self, epoch: Epoch) {
        self.epoch = epoch;
    }

    pub fn points(&self) -> &[TempoPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Insert a tempo point, replacing any point at the same position
    pub fn insert(&mut self, point: TempoPoint) {
        match self.points.binary_search_by(|p| p.position.cmp(&point.position)) {
            Ok(index) => self.points[index] = point,
            Err(index) => self.points.insert(index, point),
        }
    }

    /// Remove the tempo point simultaneous with `position`, returning it
    pub fn remove(&mut self, position: Position) -> Option<TempoPoint> {
        let index = self
            .points
            .iter()
            .position(|p| p.position.approx_eq(position))?;
        Some(self.points.remove(index))
    }

    /// Check the curve can time anything at all
    pub fn validate(&self) -> Result<(), ChartError> {
        let first = self.points.first().ok_or(ChartError::MissingTempoCurve)?;
        if first.position > self.epoch.position() {
            return Err(ChartError::NoStartingTempo {
                epoch: match self.epoch {
                    Epoch::Zero => 0,
                    Epoch::One => 1,
                },
            });
        }
        Ok(())
    }

    fn first_bpm(&self) -> Result<f64, ChartError> {
        self.validate()?;
        Ok(self.points[0].bpm)
    }

    /// Tempo of the last point at or before `position`
    pub fn tempo_at(&self, position: Position) -> Result<f64, ChartError> {
        let first = self.first_bpm()?;
        Ok(self
            .points
            .iter()
            .take_while(|p| p.position <= position)
            .last()
            .map_or(first, |p| p.bpm))
    }

    /// Tempo of the last point strictly before `position`
    ///
    /// This is the tempo that governs the interval ending at `position`.
    pub fn tempo_before(&self, position: Position) -> Result<f64, ChartError> {
        let first = self.first_bpm()?;
        Ok(self
            .points
            .iter()
            .take_while(|p| p.position < position)
            .last()
            .map_or(first, |p| p.bpm))
    }

    /// Starting tempo of the chart
    pub fn starting_tempo(&self) -> Result<f64, ChartError> {
        self.tempo_at(self.epoch.position())
    }

    /// Elapsed seconds from measure 0 to `position`
    pub fn position_to_seconds(&self, position: Position) -> Result<f64, ChartError> {
        let first = self.first_bpm()?;
        if position.is_negative() {
            return Ok(segment_seconds(position.as_measures(), first));
        }

        let mut seconds = 0.0;
        let mut cursor = Position::ZERO;
        let mut bpm = first;
        for point in &self.points {
            if point.position <= cursor {
                bpm = point.bpm;
                continue;
            }
            if point.position >= position {
                break;
            }
            seconds += segment_seconds((point.position - cursor).as_measures(), bpm);
            cursor = point.position;
            bpm = point.bpm;
        }
        Ok(seconds + segment_seconds((position - cursor).as_measures(), bpm))
    }

    /// Position reached after `seconds` of playback from measure 0
    pub fn seconds_to_position(&self, seconds: f64) -> Result<Position, ChartError> {
        Ok(Position::from_measures(self.seconds_to_measures(seconds)?))
    }

    /// Unrounded form of [`TempoCurve::seconds_to_position`]
    pub fn seconds_to_measures(&self, seconds: f64) -> Result<f64, ChartError> {
        let first = self.first_bpm()?;
        if seconds < 0.0 {
            return Ok(seconds * first / SECONDS_PER_MEASURE_AT_1_BPM);
        }

        let mut elapsed = 0.0;
        let mut cursor = Position::ZERO;
        let mut bpm = first;
        for point in &self.points {
            if point.position <= cursor {
                bpm = point.bpm;
                continue;
            }
            let length = segment_seconds((point.position - cursor).as_measures(), bpm);
            if elapsed + length > seconds {
                break;
            }
            elapsed += length;
            cursor = point.position;
            bpm = point.bpm;
        }
        Ok(cursor.as_measures() + (seconds - elapsed) * bpm / SECONDS_PER_MEASURE_AT_1_BPM)
    }

    /// Seconds elapsed between two positions, summed segment by segment
    pub fn seconds_between(&self, start: Position, end: Position) -> Result<f64, ChartError> {
        Ok(self.position_to_seconds(end)? - self.position_to_seconds(start)?)
    }

    /// Slowest and fastest tempo of the curve
    pub fn tempo_range(&self) -> Result<(f64, f64), ChartError> {
        self.validate()?;
        Ok(self
            .points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), p| {
                (low.min(p.bpm), high.max(p.bpm))
            }))
    }

    /// Tempo in effect for the longest total time
    pub fn dominant_tempo(&self, end: Position) -> Result<f64, ChartError> {
        let mut totals: Vec<(f64, f64)> = Vec::new();
        let mut bpm = self.first_bpm()?;
        let mut cursor = Position::ZERO;
        let boundaries = self
            .points
            .iter()
            .map(|p| (p.position, p.bpm))
            .chain(std::iter::once((end, bpm)));
        for (position, next_bpm) in boundaries {
            if position > cursor {
                let length = (position.min(end) - cursor).as_measures().max(0.0);
                let seconds = segment_seconds(length, bpm);
                match totals.iter_mut().find(|(b, _)| *b == bpm) {
                    Some(entry) => entry.1 += seconds,
                    None => totals.push((bpm, seconds)),
                }
                cursor = position.min(end);
            }
            bpm = next_bpm;
            if cursor >= end {
                break;
            }
        }
        Ok(totals
            .into_iter()
            .fold((bpm, f64::NEG_INFINITY), |best, entry| {
                if entry.1 > best.1 {
                    entry
                } else {
                    best
                }
            })
            .0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(points: &[(f64, f64)], epoch: Epoch) -> TempoCurve {
        TempoCurve::from_points(
            points
                .iter()
                .map(|&(m, bpm)| TempoPoint::new(Position::from_measures(m), bpm).unwrap())
                .collect(),
            epoch,
        )
    }

    #[test]
    fn test_position_rounds_to_ten_thousandths() {
        let p = Position::from_measures(1.23456);
        assert_eq!(p.units(), 12346);
        assert!(p.approx_eq(Position::from_measures(1.2345)));
        assert!(!p.approx_eq(Position::from_measures(1.2343)));
    }

    #[test]
    fn test_constant_tempo_seconds() {
        let c = curve(&[(0.0, 120.0)], Epoch::Zero);
        assert_eq!(c.position_to_seconds(Position::ONE).unwrap(), 2.0);
        assert_eq!(c.position_to_seconds(Position::from_measures(2.0)).unwrap(), 4.0);
    }

    #[test]
    fn test_tempo_change_segments() {
        let c = curve(&[(0.0, 120.0), (1.0, 240.0)], Epoch::Zero);
        let seconds = c.position_to_seconds(Position::from_measures(2.0)).unwrap();
        assert!((seconds - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_boundary_change_does_not_alter_elapsed_time() {
        let before = curve(&[(0.0, 120.0)], Epoch::Zero);
        let after = curve(&[(0.0, 120.0), (1.5, 60.0)], Epoch::Zero);
        let p = Position::from_measures(1.5);
        assert_eq!(
            before.position_to_seconds(p).unwrap(),
            after.position_to_seconds(p).unwrap()
        );
        assert_eq!(after.tempo_at(p).unwrap(), 60.0);
        assert_eq!(after.tempo_before(p).unwrap(), 120.0);
    }

    #[test]
    fn test_lead_in_uses_first_tempo() {
        let c = curve(&[(1.0, 150.0), (3.0, 75.0)], Epoch::One);
        let seconds = c.position_to_seconds(Position::ONE).unwrap();
        assert!((seconds - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_negative_position_extrapolates() {
        let c = curve(&[(0.0, 120.0), (1.0, 60.0)], Epoch::Zero);
        let seconds = c.position_to_seconds(Position::from_measures(-0.5)).unwrap();
        assert!((seconds + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_seconds_to_position_inverts() {
        let c = curve(&[(0.0, 120.0), (1.0, 240.0), (2.5, 90.0)], Epoch::Zero);
        for m in [0.0, 0.25, 1.0, 1.75, 2.5, 4.125] {
            let p = Position::from_measures(m);
            let seconds = c.position_to_seconds(p).unwrap();
            assert_eq!(c.seconds_to_position(seconds).unwrap(), p);
        }
    }

    #[test]
    fn test_empty_curve_is_missing() {
        let c = TempoCurve::new(Epoch::Zero);
        match c.position_to_seconds(Position::ONE) {
            Err(ChartError::MissingTempoCurve) => {}
            _ => panic!("Expected MissingTempoCurve"),
        }
    }

    #[test]
    fn test_late_first_tempo_has_no_start() {
        let c = curve(&[(2.0, 120.0)], Epoch::One);
        match c.tempo_at(Position::ONE) {
            Err(ChartError::NoStartingTempo { epoch }) => assert_eq!(epoch, 1),
            _ => panic!("Expected NoStartingTempo"),
        }
        let zero = curve(&[(1.0, 120.0)], Epoch::Zero);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_insert_replaces_same_position() {
        let mut c = curve(&[(0.0, 120.0), (2.0, 180.0)], Epoch::Zero);
        c.insert(TempoPoint::new(Position::from_measures(2.0), 200.0).unwrap());
        c.insert(TempoPoint::new(Position::ONE, 100.0).unwrap());
        let bpms: Vec<f64> = c.points().iter().map(|p| p.bpm).collect();
        assert_eq!(bpms, vec![120.0, 100.0, 200.0]);
    }

    #[test]
    fn test_non_positive_tempo_rejected() {
        assert!(TempoPoint::new(Position::ZERO, 0.0).is_err());
        assert!(TempoPoint::new(Position::ZERO, -120.0).is_err());
        assert!(TempoPoint::new(Position::ZERO, f64::NAN).is_err());
    }

    #[test]
    fn test_tempo_statistics() {
        let c = curve(&[(0.0, 120.0), (1.0, 240.0), (5.0, 60.0)], Epoch::Zero);
        assert_eq!(c.tempo_range().unwrap(), (60.0, 240.0));
        // 4 measures at 240 = 4s, 1 measure at 120 = 2s, 1 measure at 60 = 4s
        assert_eq!(c.dominant_tempo(Position::from_measures(6.0)).unwrap(), 240.0);
    }

    #[test]
    fn test_position_serializes_as_measures() {
        let json = serde_json::to_string(&Position::from_measures(1.25)).unwrap();
        assert_eq!(json, "1.25");
        let back: Position = serde_json::from_str("2.5").unwrap();
        assert_eq!(back, Position::from_measures(2.5));
    }
}
