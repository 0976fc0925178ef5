//! # Note Module
//!
//! Format-agnostic note model shared by every chart format.
//!
//! ## Key Types
//! - [`Note`] - Closed set of note kinds: tap, hold, slide, touch tap, touch hold
//! - [`Chart`] - Unordered bag of notes plus the tempo curve that times them
//! - [`SlidePattern`] - Numeric slide shape id; symbols exist only at the DSL boundary
//!
//! ## Conventions
//! - Lanes are zero-based (`0..=7`); text formats display them one-based.
//! - A slide's `duration` never includes its `delay`. Formats that store the sum
//!   convert at their boundary.
//! - How many slides leave a star is derived from the bag with
//!   [`Chart::slide_count`], never stored.

use crate::error::ChartError;
use crate::time::{Epoch, Position, TempoCurve, TempoPoint};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Default delay between a slide's star and the start of its motion, in measures
pub const DEFAULT_SLIDE_DELAY: f64 = 0.25;

/// One of the eight buttons around the screen, zero-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Lane(u8);

impl Lane {
    pub const COUNT: u8 = 8;

    pub fn new(index: u8) -> Result<Self, ChartError> {
        if index >= Self::COUNT {
            return Err(ChartError::invalid_field(format!(
                "lane {} is out of range 0..=7",
                index
            )));
        }
        Ok(Lane(index))
    }

    /// Parse a one-based lane digit (`'1'..='8'`)
    pub fn from_display(digit: u8) -> Result<Self, ChartError> {
        match digit {
            1..=8 => Ok(Lane(digit - 1)),
            _ => Err(ChartError::invalid_field(format!("button {} does not exist", digit))),
        }
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// One-based number as written in text formats
    pub fn display(self) -> u8 {
        self.0 + 1
    }

    /// Lane `steps` positions clockwise (negative for counterclockwise)
    pub fn rotate(self, steps: i8) -> Lane {
        Lane((self.0 as i8 + steps).rem_euclid(Self::COUNT as i8) as u8)
    }
}

impl TryFrom<u8> for Lane {
    type Error = ChartError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Lane::new(index)
    }
}

impl From<Lane> for u8 {
    fn from(lane: Lane) -> Self {
        lane.0
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Touch sensor region
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TouchZone {
    A,
    B,
    C,
    D,
    E,
}

impl TouchZone {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'A' => Some(TouchZone::A),
            'B' => Some(TouchZone::B),
            'C' => Some(TouchZone::C),
            'D' => Some(TouchZone::D),
            'E' => Some(TouchZone::E),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            TouchZone::A => 'A',
            TouchZone::B => 'B',
            TouchZone::C => 'C',
            TouchZone::D => 'D',
            TouchZone::E => 'E',
        }
    }
}

/// Numeric slide shape id, `1..=13`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlidePattern(u8);

impl SlidePattern {
    pub const STRAIGHT: SlidePattern = SlidePattern(1);
    pub const CIRCLE_CCW: SlidePattern = SlidePattern(2);
    pub const CIRCLE_CW: SlidePattern = SlidePattern(3);
    pub const CURVE_P: SlidePattern = SlidePattern(4);
    pub const CURVE_Q: SlidePattern = SlidePattern(5);
    pub const THUNDER_S: SlidePattern = SlidePattern(6);
    pub const THUNDER_Z: SlidePattern = SlidePattern(7);
    pub const V_SHAPE: SlidePattern = SlidePattern(8);
    pub const LOOP_PP: SlidePattern = SlidePattern(9);
    pub const LOOP_QQ: SlidePattern = SlidePattern(10);
    pub const BENT_CCW: SlidePattern = SlidePattern(11);
    pub const BENT_CW: SlidePattern = SlidePattern(12);
    pub const FAN: SlidePattern = SlidePattern(13);

    pub fn new(id: u8) -> Result<Self, ChartError> {
        if !(1..=13).contains(&id) {
            return Err(ChartError::malformed(format!("unknown slide pattern id {}", id)));
        }
        Ok(SlidePattern(id))
    }

    pub fn id(self) -> u8 {
        self.0
    }

    /// Patterns that bend around a reflection lane
    pub fn has_reflect(self) -> bool {
        self == Self::BENT_CCW || self == Self::BENT_CW
    }
}

impl TryFrom<u8> for SlidePattern {
    type Error = ChartError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        SlidePattern::new(id)
    }
}

impl From<SlidePattern> for u8 {
    fn from(pattern: SlidePattern) -> Self {
        pattern.0
    }
}

fn check_length(position: Position, length: Position, what: &str) -> Result<(), ChartError> {
    if length.is_negative() {
        return Err(ChartError::invalid_note(
            position.as_measures(),
            format!("{} must not be negative, got {}", what, length),
        ));
    }
    Ok(())
}

fn check_position(position: Position) -> Result<(), ChartError> {
    if position.is_negative() {
        return Err(ChartError::invalid_note(
            position.as_measures(),
            "notes cannot start before measure 0",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tap {
    pub position: Position,
    pub lane: Lane,
    pub is_break: bool,
    pub is_star: bool,
    pub is_ex: bool,
}

impl Tap {
    pub fn new(position: Position, lane: Lane) -> Result<Self, ChartError> {
        check_position(position)?;
        Ok(Self {
            position,
            lane,
            is_break: false,
            is_star: false,
            is_ex: false,
        })
    }

    pub fn star(position: Position, lane: Lane) -> Result<Self, ChartError> {
        Ok(Self {
            is_star: true,
            ..Self::new(position, lane)?
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hold {
    pub position: Position,
    pub lane: Lane,
    pub duration: Position,
    pub is_ex: bool,
}

impl Hold {
    pub fn new(position: Position, lane: Lane, duration: Position) -> Result<Self, ChartError> {
        check_position(position)?;
        check_length(position, duration, "hold duration")?;
        Ok(Self {
            position,
            lane,
            duration,
            is_ex: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub position: Position,
    pub start_lane: Lane,
    pub end_lane: Lane,
    pub pattern: SlidePattern,
    /// Time the star moves along the path, excluding `delay`
    pub duration: Position,
    pub delay: Position,
    pub reflect_lane: Option<Lane>,
}

impl Slide {
    pub fn new(
        position: Position,
        start_lane: Lane,
        end_lane: Lane,
        pattern: SlidePattern,
        duration: Position,
        delay: Position,
    ) -> Result<Self, ChartError> {
        check_position(position)?;
        check_length(position, duration, "slide duration")?;
        check_length(position, delay, "slide delay")?;
        let reflect_lane = match pattern {
            SlidePattern::BENT_CCW => Some(start_lane.rotate(-2)),
            SlidePattern::BENT_CW => Some(start_lane.rotate(2)),
            _ => None,
        };
        Ok(Self {
            position,
            start_lane,
            end_lane,
            pattern,
            duration,
            delay,
            reflect_lane,
        })
    }

    /// Slide with the standard quarter-measure delay
    pub fn with_default_delay(
        position: Position,
        start_lane: Lane,
        end_lane: Lane,
        pattern: SlidePattern,
        duration: Position,
    ) -> Result<Self, ChartError> {
        Self::new(
            position,
            start_lane,
            end_lane,
            pattern,
            duration,
            Position::from_measures(DEFAULT_SLIDE_DELAY),
        )
    }

    pub fn has_default_delay(&self) -> bool {
        self.delay
            .approx_eq(Position::from_measures(DEFAULT_SLIDE_DELAY))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchTap {
    pub position: Position,
    /// Sensor number within the zone, zero-based
    pub lane: u8,
    pub zone: TouchZone,
    pub is_firework: bool,
}

impl TouchTap {
    pub fn new(position: Position, zone: TouchZone, lane: u8) -> Result<Self, ChartError> {
        check_position(position)?;
        check_touch_lane(position, zone, lane)?;
        Ok(Self {
            position,
            lane,
            zone,
            is_firework: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchHold {
    pub position: Position,
    pub lane: u8,
    pub zone: TouchZone,
    pub duration: Position,
    pub is_firework: bool,
}

impl TouchHold {
    pub fn new(
        position: Position,
        zone: TouchZone,
        lane: u8,
        duration: Position,
    ) -> Result<Self, ChartError> {
        check_position(position)?;
        check_touch_lane(position, zone, lane)?;
        check_length(position, duration, "touch hold duration")?;
        Ok(Self {
            position,
            lane,
            zone,
            duration,
            is_firework: false,
        })
    }
}

fn check_touch_lane(position: Position, zone: TouchZone, lane: u8) -> Result<(), ChartError> {
    let limit = if zone == TouchZone::C { 2 } else { Lane::COUNT };
    if lane >= limit {
        return Err(ChartError::invalid_note(
            position.as_measures(),
            format!("touch sensor {}{} does not exist", zone.letter(), lane + 1),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Note {
    Tap(Tap),
    Hold(Hold),
    Slide(Slide),
    TouchTap(TouchTap),
    TouchHold(TouchHold),
}

impl Note {
    pub fn position(&self) -> Position {
        match self {
            Note::Tap(n) => n.position,
            Note::Hold(n) => n.position,
            Note::Slide(n) => n.position,
            Note::TouchTap(n) => n.position,
            Note::TouchHold(n) => n.position,
        }
    }

    pub fn set_position(&mut self, position: Position) {
        match self {
            Note::Tap(n) => n.position = position,
            Note::Hold(n) => n.position = position,
            Note::Slide(n) => n.position = position,
            Note::TouchTap(n) => n.position = position,
            Note::TouchHold(n) => n.position = position,
        }
    }

    /// Last position the note is still active at
    pub fn end_position(&self) -> Position {
        match self {
            Note::Tap(n) => n.position,
            Note::TouchTap(n) => n.position,
            Note::Hold(n) => n.position + n.duration,
            Note::TouchHold(n) => n.position + n.duration,
            Note::Slide(n) => n.position + n.delay + n.duration,
        }
    }

    pub fn is_touch(&self) -> bool {
        matches!(self, Note::TouchTap(_) | Note::TouchHold(_))
    }

    /// Button lane, or sensor number for touch notes
    fn lane_key(&self) -> (u8, u8) {
        match self {
            Note::Tap(n) => (0, n.lane.index()),
            Note::Hold(n) => (0, n.lane.index()),
            Note::Slide(n) => (0, n.start_lane.index()),
            Note::TouchTap(n) => (1 + n.zone as u8, n.lane),
            Note::TouchHold(n) => (1 + n.zone as u8, n.lane),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Note::Tap(_) => 0,
            Note::Hold(_) => 1,
            Note::Slide(_) => 2,
            Note::TouchTap(_) => 3,
            Note::TouchHold(_) => 4,
        }
    }

    /// Chart order: by position, then lane, with a star placed before the slides it launches
    pub fn chart_order(&self, other: &Note) -> Ordering {
        self.position()
            .cmp(&other.position())
            .then_with(|| self.lane_key().cmp(&other.lane_key()))
            .then_with(|| self.kind_rank().cmp(&other.kind_rank()))
    }

    /// Same kind, same lane and simultaneous
    fn matches(&self, other: &Note) -> bool {
        self.kind_rank() == other.kind_rank()
            && self.lane_key() == other.lane_key()
            && self.position().approx_eq(other.position())
            && match (self, other) {
                (Note::Slide(a), Note::Slide(b)) => {
                    a.end_lane == b.end_lane && a.pattern == b.pattern
                }
                _ => true,
            }
    }
}

/// A chart: notes in no particular order, plus their tempo curve
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Chart {
    notes: Vec<Note>,
    tempo: TempoCurve,
}

impl Chart {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            notes: Vec::new(),
            tempo: TempoCurve::new(epoch),
        }
    }

    pub fn with_tempo(tempo: TempoCurve) -> Self {
        Self {
            notes: Vec::new(),
            tempo,
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut Vec<Note> {
        &mut self.notes
    }

    pub fn tempo(&self) -> &TempoCurve {
        &self.tempo
    }

    pub fn tempo_mut(&mut self) -> &mut TempoCurve {
        &mut self.tempo
    }

    pub fn epoch(&self) -> Epoch {
        self.tempo.epoch()
    }

    pub fn into_parts(self) -> (Vec<Note>, TempoCurve) {
        (self.notes, self.tempo)
    }

    pub fn add_note(&mut self, note: Note) {
        self.notes.push(note);
    }

    pub fn add_tap(&mut self, tap: Tap) {
        self.add_note(Note::Tap(tap));
    }

    pub fn add_hold(&mut self, hold: Hold) {
        self.add_note(Note::Hold(hold));
    }

    pub fn add_slide(&mut self, slide: Slide) {
        self.add_note(Note::Slide(slide));
    }

    pub fn add_touch_tap(&mut self, touch: TouchTap) {
        self.add_note(Note::TouchTap(touch));
    }

    pub fn add_touch_hold(&mut self, touch: TouchHold) {
        self.add_note(Note::TouchHold(touch));
    }

    /// Remove one note of the same kind at the same lane and position
    ///
    /// Returns `false` when nothing matched.
    pub fn remove_note(&mut self, target: &Note) -> bool {
        match self.notes.iter().position(|n| n.matches(target)) {
            Some(index) => {
                self.notes.remove(index);
                true
            }
            None => false,
        }
    }

    /// Set the tempo from `position` onwards, replacing a change already there
    pub fn set_tempo(&mut self, position: Position, bpm: f64) -> Result<(), ChartError> {
        self.tempo.insert(TempoPoint::new(position, bpm)?);
        Ok(())
    }

    pub fn remove_tempo(&mut self, position: Position) -> Option<TempoPoint> {
        self.tempo.remove(position)
    }

    pub fn tempo_at(&self, position: Position) -> Result<f64, ChartError> {
        self.tempo.tempo_at(position)
    }

    /// Number of slides launched from the star at `lane` and `position`
    pub fn slide_count(&self, position: Position, lane: Lane) -> usize {
        self.notes
            .iter()
            .filter(|n| match n {
                Note::Slide(s) => s.start_lane == lane && s.position.approx_eq(position),
                _ => false,
            })
            .count()
    }

    /// Notes in chart order
    pub fn sorted_notes(&self) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self.notes.iter().collect();
        notes.sort_by(|a, b| a.chart_order(b));
        notes
    }

    pub fn sort(&mut self) {
        self.notes.sort_by(|a, b| a.chart_order(b));
    }

    /// Latest position any note is still active at
    pub fn end_position(&self) -> Position {
        self.notes
            .iter()
            .map(Note::end_position)
            .max()
            .unwrap_or(Position::ZERO)
    }
}
