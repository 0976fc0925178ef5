//! # DSL Parser
//!
//! Turns chart text into a [`Chart`].
//!
//! ## Pipeline
//! 1. Whitespace is stripped and the text is split on `,` into fragments.
//! 2. Each fragment is parsed on its own into directives and position-less notes.
//!    Fragments do not depend on each other's content, so a [`ParserSession`]
//!    parses them on a worker pool.
//! 3. A sequential fold walks the parsed fragments, tracking the running position
//!    (starting at measure 1), divisor (starting at 4) and tempo. Each fragment's
//!    notes land at the running position, which then advances by `1 / divisor`.
//!
//! ## Fragment Grammar
//! ```text
//! fragment   := directive* (group (('/' | '`') group)*)? | 'E'
//! directive  := '(' number ')' | '{' integer '}'
//! group      := digit digit+                        each taps, e.g. `15`
//!             | lane modifier* 'h' modifier* duration?
//!             | lane modifier* leg ('*' leg)*
//!             | lane modifier*
//!             | zone digit? ('f' | 'h')* duration?
//! leg        := pattern ('V' reflect)? lane duration
//! duration   := '[' (number '#')? integer ':' integer ']'
//! ```
//! A slide head places an implicit star on its start lane unless a tapless
//! modifier (`?`, `!`, `$`) is given or the lane already has a star in the
//! same fragment. A `[bpm#d:n]` duration scales both the length and the standard
//! quarter-measure delay by `current tempo / bpm`.
//!
//! ## Related Modules
//! - `lexer` - Tokens for one fragment
//! - `slide` - Symbol to pattern id conversion

use super::lexer::{Lexer, LocatedToken, Token};
use crate::error::{ChartError, Location};
use crate::note::{
    Chart, Hold, Lane, Slide, SlidePattern, Tap, TouchHold, TouchTap, TouchZone,
    DEFAULT_SLIDE_DELAY,
};
use crate::slide::symbol_to_pattern;
use crate::time::{Epoch, Position};
use log::{debug, warn};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Position shift of a pseudo-each note relative to the note before it
pub const PSEUDO_EACH_SHIFT: f64 = 0.0027;

/// Divisor in effect before any `{d}` directive
pub const DEFAULT_DIVISOR: u32 = 4;

/// Length written in brackets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationSpec {
    pub denominator: u32,
    pub numerator: u32,
    pub equivalent_bpm: Option<f64>,
}

impl DurationSpec {
    pub fn measures(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlideLeg {
    pub pattern: SlidePattern,
    pub end: Lane,
    pub duration: DurationSpec,
}

/// A note as written, before it has a position
#[derive(Debug, Clone, PartialEq)]
pub enum NoteSpec {
    Tap {
        lane: Lane,
        is_break: bool,
        is_star: bool,
        is_ex: bool,
    },
    Hold {
        lane: Lane,
        duration: Option<DurationSpec>,
        is_ex: bool,
    },
    Slide {
        start: Lane,
        legs: Vec<SlideLeg>,
        is_break: bool,
        is_ex: bool,
        tapless: bool,
    },
    TouchTap {
        zone: TouchZone,
        lane: u8,
        is_firework: bool,
    },
    TouchHold {
        zone: TouchZone,
        lane: u8,
        duration: Option<DurationSpec>,
        is_firework: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNote {
    pub spec: NoteSpec,
    /// Written after a backtick
    pub pseudo_each: bool,
}

/// Everything one fragment says
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fragment {
    pub text: String,
    pub tempo: Option<f64>,
    pub divisor: Option<u32>,
    pub notes: Vec<ParsedNote>,
    pub end: bool,
}

#[derive(Default)]
struct Modifiers {
    is_break: bool,
    is_ex: bool,
    is_star: bool,
    tapless: bool,
    is_firework: bool,
    hold: bool,
}

/// Parser for the tokens of one fragment
pub struct Parser {
    tokens: Vec<LocatedToken>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<LocatedToken>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn current(&self) -> Option<Token> {
        self.tokens.get(self.position).map(|t| t.token)
    }

    fn peek_next(&self) -> Option<Token> {
        self.tokens.get(self.position + 1).map(|t| t.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.current();
        self.position += 1;
        token
    }

    fn error_here(&self, message: &str) -> ChartError {
        match self.tokens.get(self.position) {
            Some(t) => ChartError::malformed(format!("{} at column {}", message, t.column)),
            None => ChartError::malformed(format!("{} at end of fragment", message)),
        }
    }

    fn expect(&mut self, expected: Token, message: &str) -> Result<(), ChartError> {
        if self.current() == Some(expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(message))
        }
    }

    fn parse_number(&mut self) -> Result<f64, ChartError> {
        let mut text = String::new();
        while let Some(token) = self.current() {
            match token {
                Token::Digit(d) => text.push(char::from(b'0' + d)),
                Token::Dot => text.push('.'),
                _ => break,
            }
            self.advance();
        }
        text.parse()
            .map_err(|_| self.error_here(&format!("expected a number, found `{}`", text)))
    }

    fn parse_integer(&mut self) -> Result<u32, ChartError> {
        let mut value: u32 = 0;
        let mut seen = false;
        while let Some(Token::Digit(d)) = self.current() {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(d as u32))
                .ok_or_else(|| self.error_here("number is too large"))?;
            seen = true;
            self.advance();
        }
        if !seen {
            return Err(self.error_here("expected an integer"));
        }
        Ok(value)
    }

    /// Parse a whole fragment
    pub fn parse_fragment(&mut self) -> Result<Fragment, ChartError> {
        let mut fragment = Fragment::default();

        loop {
            match self.current() {
                Some(Token::LeftParen) => {
                    self.advance();
                    let bpm = self.parse_number()?;
                    self.expect(Token::RightParen, "expected `)` after tempo")?;
                    if !(bpm > 0.0) {
                        return Err(ChartError::invalid_field(format!(
                            "tempo must be positive, got {}",
                            bpm
                        )));
                    }
                    fragment.tempo = Some(bpm);
                }
                Some(Token::LeftBrace) => {
                    self.advance();
                    let divisor = self.parse_integer()?;
                    self.expect(Token::RightBrace, "expected `}` after divisor")?;
                    if divisor == 0 {
                        return Err(ChartError::malformed("divisor must be positive"));
                    }
                    fragment.divisor = Some(divisor);
                }
                _ => break,
            }
        }

        if self.current() == Some(Token::Zone(TouchZone::E)) && self.peek_next().is_none() {
            self.advance();
            fragment.end = true;
            return Ok(fragment);
        }
        if self.current().is_none() {
            return Ok(fragment);
        }

        let mut pseudo_each = false;
        loop {
            self.parse_group(pseudo_each, &mut fragment.notes)?;
            match self.current() {
                Some(Token::Slash) => pseudo_each = false,
                Some(Token::Backtick) => pseudo_each = true,
                None => break,
                Some(_) => return Err(self.error_here("expected `/` between notes")),
            }
            self.advance();
        }
        Ok(fragment)
    }

    fn at_group_end(&self) -> bool {
        matches!(
            self.current(),
            None | Some(Token::Slash) | Some(Token::Backtick)
        )
    }

    fn skip_group(&mut self) {
        while !self.at_group_end() {
            self.advance();
        }
    }

    fn parse_modifiers(&mut self, modifiers: &mut Modifiers) {
        while let Some(token) = self.current() {
            match token {
                Token::Break => modifiers.is_break = true,
                Token::Ex => modifiers.is_ex = true,
                Token::Star => modifiers.is_star = true,
                Token::Tapless => modifiers.tapless = true,
                Token::Firework => modifiers.is_firework = true,
                Token::Hold => modifiers.hold = true,
                Token::NoStar => warn!("ignoring `@` marker"),
                _ => break,
            }
            self.advance();
        }
    }

    fn parse_group(&mut self, pseudo_each: bool, notes: &mut Vec<ParsedNote>) -> Result<(), ChartError> {
        let mut push = |spec: NoteSpec| notes.push(ParsedNote { spec, pseudo_each });

        match self.current() {
            Some(Token::Digit(_)) if matches!(self.peek_next(), Some(Token::Digit(_))) => {
                while let Some(Token::Digit(d)) = self.current() {
                    self.advance();
                    if d == 0 {
                        warn!("ignoring tap on button 0");
                        continue;
                    }
                    push(NoteSpec::Tap {
                        lane: Lane::from_display(d)?,
                        is_break: false,
                        is_star: false,
                        is_ex: false,
                    });
                }
                if !self.at_group_end() {
                    return Err(self.error_here("each taps cannot carry modifiers"));
                }
                Ok(())
            }
            Some(Token::Digit(0)) => {
                warn!("ignoring note on button 0");
                self.skip_group();
                Ok(())
            }
            Some(Token::Digit(d)) => {
                self.advance();
                let lane = Lane::from_display(d)?;
                let mut modifiers = Modifiers::default();
                self.parse_modifiers(&mut modifiers);

                if let Some(Token::Pattern(_)) = self.current() {
                    let legs = self.parse_slide_legs(lane)?;
                    push(NoteSpec::Slide {
                        start: lane,
                        legs,
                        is_break: modifiers.is_break,
                        is_ex: modifiers.is_ex,
                        tapless: modifiers.tapless || modifiers.is_star,
                    });
                } else if modifiers.hold {
                    let duration = self.parse_optional_duration()?;
                    self.parse_modifiers(&mut modifiers);
                    push(NoteSpec::Hold {
                        lane,
                        duration,
                        is_ex: modifiers.is_ex,
                    });
                } else {
                    push(NoteSpec::Tap {
                        lane,
                        is_break: modifiers.is_break,
                        is_star: modifiers.is_star,
                        is_ex: modifiers.is_ex,
                    });
                }
                if !self.at_group_end() {
                    return Err(self.error_here("unexpected token after note"));
                }
                Ok(())
            }
            Some(Token::Zone(zone)) => {
                self.advance();
                let lane = match self.current() {
                    Some(Token::Digit(d)) => {
                        self.advance();
                        if d == 0 {
                            return Err(ChartError::invalid_field(format!(
                                "touch sensor {}0 does not exist",
                                zone.letter()
                            )));
                        }
                        d - 1
                    }
                    _ => 0,
                };
                let mut modifiers = Modifiers::default();
                self.parse_modifiers(&mut modifiers);
                if modifiers.hold {
                    let duration = self.parse_optional_duration()?;
                    self.parse_modifiers(&mut modifiers);
                    push(NoteSpec::TouchHold {
                        zone,
                        lane,
                        duration,
                        is_firework: modifiers.is_firework,
                    });
                } else {
                    push(NoteSpec::TouchTap {
                        zone,
                        lane,
                        is_firework: modifiers.is_firework,
                    });
                }
                if !self.at_group_end() {
                    return Err(self.error_here("unexpected token after touch note"));
                }
                Ok(())
            }
            Some(Token::Asterisk) => Err(self.error_here("`*` must follow a slide")),
            _ => Err(self.error_here("expected a note")),
        }
    }

    fn parse_slide_legs(&mut self, start: Lane) -> Result<Vec<SlideLeg>, ChartError> {
        let mut legs = Vec::new();
        loop {
            let symbol = match self.advance() {
                Some(Token::Pattern(c)) if (c == 'p' || c == 'q') && self.current() == Some(Token::Pattern(c)) => {
                    self.advance();
                    if c == 'p' { "pp" } else { "qq" }
                }
                Some(Token::Pattern(c)) => pattern_symbol(c),
                _ => {
                    self.position -= 1;
                    return Err(self.error_here("expected a slide pattern"));
                }
            };

            let reflect = if symbol == "V" {
                Some(self.parse_lane("expected a reflection lane after `V`")?)
            } else {
                None
            };
            let end = self.parse_lane("expected the slide's end lane")?;
            let pattern = symbol_to_pattern(symbol, start, end, reflect)?;

            let duration = self
                .parse_optional_duration()?
                .ok_or_else(|| self.error_here("slide needs a `[d:n]` duration"))?;
            legs.push(SlideLeg {
                pattern,
                end,
                duration,
            });

            if self.current() == Some(Token::Asterisk) {
                self.advance();
            } else {
                return Ok(legs);
            }
        }
    }

    fn parse_lane(&mut self, message: &str) -> Result<Lane, ChartError> {
        match self.current() {
            Some(Token::Digit(d)) => {
                self.advance();
                Lane::from_display(d)
            }
            _ => Err(self.error_here(message)),
        }
    }

    fn parse_optional_duration(&mut self) -> Result<Option<DurationSpec>, ChartError> {
        if self.current() != Some(Token::LeftBracket) {
            return Ok(None);
        }
        self.advance();

        let first = self.parse_number()?;
        let (equivalent_bpm, denominator) = if self.current() == Some(Token::Hash) {
            self.advance();
            if !(first > 0.0) {
                return Err(ChartError::invalid_field("equivalent tempo must be positive"));
            }
            (Some(first), self.parse_integer()?)
        } else if first.fract() == 0.0 && first >= 1.0 && first <= u32::MAX as f64 {
            (None, first as u32)
        } else {
            return Err(self.error_here("duration denominator must be a positive integer"));
        };
        self.expect(Token::Colon, "expected `:` in duration")?;
        let numerator = self.parse_integer()?;
        self.expect(Token::RightBracket, "expected `]` after duration")?;

        if denominator == 0 {
            return Err(ChartError::malformed("duration denominator must be positive"));
        }
        Ok(Some(DurationSpec {
            denominator,
            numerator,
            equivalent_bpm,
        }))
    }
}

fn pattern_symbol(c: char) -> &'static str {
    match c {
        '-' => "-",
        '^' => "^",
        '<' => "<",
        '>' => ">",
        'v' => "v",
        's' => "s",
        'z' => "z",
        'w' => "w",
        'p' => "p",
        'q' => "q",
        _ => "V",
    }
}

/// Parse one whitespace-free fragment
pub fn parse_fragment(text: &str) -> Result<Fragment, ChartError> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut fragment = Parser::new(tokens).parse_fragment()?;
    fragment.text = text.to_string();
    Ok(fragment)
}

/// Strip whitespace and split chart text into fragments
pub fn split_fragments(text: &str) -> Vec<String> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    compact.split(',').map(str::to_string).collect()
}

/// Running state of the sequential fold
struct Cursor {
    measures: f64,
    divisor: u32,
    tempo: Option<f64>,
}

fn scale_for(duration: &DurationSpec, tempo: Option<f64>) -> Result<f64, ChartError> {
    match (duration.equivalent_bpm, tempo) {
        (None, _) => Ok(1.0),
        (Some(equivalent), Some(current)) => Ok(current / equivalent),
        (Some(_), None) => Err(ChartError::malformed(
            "`[bpm#d:n]` duration needs a tempo to be set first",
        )),
    }
}

fn length_of(duration: Option<&DurationSpec>, tempo: Option<f64>) -> Result<Position, ChartError> {
    match duration {
        None => Ok(Position::ZERO),
        Some(d) => Ok(Position::from_measures(d.measures() * scale_for(d, tempo)?)),
    }
}

fn place_fragment(chart: &mut Chart, fragment: &Fragment, cursor: &Cursor) -> Result<(), ChartError> {
    let mut shift = 0.0;
    let mut star_lanes: Vec<Lane> = Vec::new();

    for note in &fragment.notes {
        shift = if note.pseudo_each { shift + PSEUDO_EACH_SHIFT } else { 0.0 };
        let position = Position::from_measures(cursor.measures + shift);

        match &note.spec {
            NoteSpec::Tap {
                lane,
                is_break,
                is_star,
                is_ex,
            } => {
                if *is_star {
                    star_lanes.push(*lane);
                }
                chart.add_tap(Tap {
                    is_break: *is_break,
                    is_star: *is_star,
                    is_ex: *is_ex,
                    ..Tap::new(position, *lane)?
                });
            }
            NoteSpec::Hold {
                lane,
                duration,
                is_ex,
            } => {
                let length = length_of(duration.as_ref(), cursor.tempo)?;
                chart.add_hold(Hold {
                    is_ex: *is_ex,
                    ..Hold::new(position, *lane, length)?
                });
            }
            NoteSpec::Slide {
                start,
                legs,
                is_break,
                is_ex,
                tapless,
            } => {
                if !*tapless && !star_lanes.contains(start) {
                    star_lanes.push(*start);
                    chart.add_tap(Tap {
                        is_break: *is_break,
                        is_ex: *is_ex,
                        ..Tap::star(position, *start)?
                    });
                }
                for leg in legs {
                    let scale = scale_for(&leg.duration, cursor.tempo)?;
                    chart.add_slide(Slide::new(
                        position,
                        *start,
                        leg.end,
                        leg.pattern,
                        Position::from_measures(leg.duration.measures() * scale),
                        Position::from_measures(DEFAULT_SLIDE_DELAY * scale),
                    )?);
                }
            }
            NoteSpec::TouchTap {
                zone,
                lane,
                is_firework,
            } => {
                chart.add_touch_tap(TouchTap {
                    is_firework: *is_firework,
                    ..TouchTap::new(position, *zone, *lane)?
                });
            }
            NoteSpec::TouchHold {
                zone,
                lane,
                duration,
                is_firework,
            } => {
                let length = length_of(duration.as_ref(), cursor.tempo)?;
                chart.add_touch_hold(TouchHold {
                    is_firework: *is_firework,
                    ..TouchHold::new(position, *zone, *lane, length)?
                });
            }
        }
    }
    Ok(())
}

/// Fold parsed fragments into a chart, in order
pub fn build_chart(fragments: &[Fragment]) -> Result<Chart, ChartError> {
    let mut chart = Chart::new(Epoch::One);
    let mut cursor = Cursor {
        measures: 1.0,
        divisor: DEFAULT_DIVISOR,
        tempo: None,
    };

    for (index, fragment) in fragments.iter().enumerate() {
        let locate = |e: ChartError| {
            e.at(Location::Fragment {
                index,
                text: fragment.text.clone(),
            })
        };

        if let Some(bpm) = fragment.tempo {
            chart
                .set_tempo(Position::from_measures(cursor.measures), bpm)
                .map_err(locate)?;
            cursor.tempo = Some(bpm);
        }
        if let Some(divisor) = fragment.divisor {
            cursor.divisor = divisor;
        }
        if fragment.end {
            break;
        }
        place_fragment(&mut chart, fragment, &cursor).map_err(locate)?;
        cursor.measures += 1.0 / cursor.divisor as f64;
    }

    if !chart.notes().is_empty() || !chart.tempo().is_empty() {
        chart.tempo().validate()?;
    }
    Ok(chart)
}

/// One parse call: a worker pool plus the cancellation flag its workers share
pub struct ParserSession {
    pool: rayon::ThreadPool,
    cancelled: AtomicBool,
}

impl ParserSession {
    /// Create a session with `workers` threads, or one per core when `None`
    pub fn new(workers: Option<usize>) -> Result<Self, ChartError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.unwrap_or(0))
            .thread_name(|i| format!("dsl-parser-{}", i))
            .build()
            .map_err(|e| ChartError::Config(format!("Cannot start parser workers: {}", e)))?;
        Ok(Self {
            pool,
            cancelled: AtomicBool::new(false),
        })
    }

    /// Parse every fragment concurrently
    ///
    /// The first failure stops fragments that have not started yet. The error of
    /// the earliest failing fragment is returned; no partial chart is produced.
    pub fn parse_fragments(&mut self, fragments: &[String]) -> Result<Vec<Fragment>, ChartError> {
        self.cancelled.store(false, Ordering::SeqCst);
        let cancelled = &self.cancelled;

        let results: Vec<Option<Result<Fragment, ChartError>>> = self.pool.install(|| {
            fragments
                .par_iter()
                .enumerate()
                .map(|(index, text)| {
                    if cancelled.load(Ordering::Relaxed) {
                        return None;
                    }
                    let result = parse_fragment(text).map_err(|e| {
                        cancelled.store(true, Ordering::Relaxed);
                        e.at(Location::Fragment {
                            index,
                            text: text.clone(),
                        })
                    });
                    Some(result)
                })
                .collect()
        });

        let mut parsed = Vec::with_capacity(results.len());
        let mut skipped = false;
        for result in results {
            match result {
                Some(Ok(fragment)) => parsed.push(fragment),
                Some(Err(e)) => return Err(e),
                None => skipped = true,
            }
        }
        if skipped {
            return Err(ChartError::malformed("parsing was cancelled"));
        }
        Ok(parsed)
    }

    /// Parse chart text into a chart
    pub fn parse(&mut self, text: &str) -> Result<Chart, ChartError> {
        let fragments = split_fragments(text);
        let parsed = self.parse_fragments(&fragments)?;
        debug!("parsed {} fragments", parsed.len());
        build_chart(&parsed)
    }
}
