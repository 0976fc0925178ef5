//! # DSL Serializer
//!
//! Writes a [`Chart`] back out as DSL text that re-parses to the same timeline.
//!
//! ## Purpose
//! Notes arrive with arbitrary positions. The DSL can only express a position as
//! a count of `1 / divisor` steps from the previous fragment, so the serializer has
//! to choose divisors and rest counts that land on every note exactly, while
//! emitting as few `{d}` directives as it can.
//!
//! ## Steps
//! 1. Every note start and tempo change becomes an exact fraction of a measure.
//!    Positions are stored rounded, so the fraction recovered is the simplest one
//!    on a common grid that rounds to the stored value, bounded by the caller's
//!    denominator limit.
//! 2. Each whole measure gets a shared divisor (at most 64) when one fits all of
//!    its positions.
//! 3. Walking the positions, each gap is expressed as `ticks` steps of a divisor
//!    followed by whole-measure rests. Within a measure the running divisor is
//!    reused whenever it divides the gap, then the measure's shared divisor is tried. Failing both, a
//!    divisor that also fits the following gap is preferred, so a lone rest does
//!    not cause two switches.
//! 4. Fragment bodies list the tempo, taps, holds, touch notes and then slides,
//!    grouped by start lane so a star with several slides is written once.
//!
//! ## Related Modules
//! - `rational` - Bounded-denominator approximation
//! - `slide` - Pattern id to symbol conversion

use super::parser::DEFAULT_DIVISOR;
use crate::error::ChartError;
use crate::note::{Chart, Lane, Note, Slide, Tap, DEFAULT_SLIDE_DELAY};
use crate::rational::{
    from_position, lcm, limit_denominator, snap, split_whole, to_f64, to_position, Rational,
};
use crate::slide::pattern_to_symbol;
use crate::time::{Position, TempoCurve};
use log::debug;
use std::collections::BTreeMap;

/// Largest divisor considered when sharing one across a gap or measure
pub const MAX_SHARED_DIVISOR: i64 = 64;

/// End-of-chart marker
pub const END_MARKER: &str = "E";

/// Format a number with at most four decimals and no trailing zeros
pub fn format_decimal(value: f64) -> String {
    let text = format!("{:.4}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Holds may use twice the caller's denominator bound
const HOLD_DENOMINATOR_FACTOR: i64 = 2;

/// Slide lengths, often rescaled by an equivalent tempo, get ten times the bound
const SLIDE_DENOMINATOR_FACTOR: i64 = 10;

fn duration_token(length: Position, max_denominator: i64) -> String {
    let length = limit_denominator(snap(length, max_denominator), max_denominator);
    format!("[{}:{}]", length.denom(), length.numer())
}

/// Where a note stops sounding, from the recovered fractions of its parts
fn note_end(note: &Note, max_denominator: i64) -> Rational {
    let start = snap(note.position(), max_denominator);
    match note {
        Note::Tap(_) | Note::TouchTap(_) => start,
        Note::Hold(hold) => start + snap(hold.duration, max_denominator),
        Note::TouchHold(touch) => start + snap(touch.duration, max_denominator),
        Note::Slide(slide) => {
            start + snap(slide.delay, max_denominator) + snap(slide.duration, max_denominator)
        }
    }
}

/// Smallest divisor fitting every offset within one whole measure
fn measure_divisor(offsets: &[Rational]) -> Option<i64> {
    offsets.iter().try_fold(1i64, |acc, offset| {
        let divisor = lcm(acc, *split_whole(*offset).1.denom());
        (divisor <= MAX_SHARED_DIVISOR).then_some(divisor)
    })
}

/// How to advance from one position to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rest {
    divisor: i64,
    ticks: i64,
    whole: i64,
}

fn ticks_of(gap: Rational, divisor: i64) -> Rest {
    Rest {
        divisor,
        ticks: (gap * Rational::from_integer(divisor)).to_integer(),
        whole: 0,
    }
}

fn choose_rest(
    gap: Rational,
    following: Option<Rational>,
    running: i64,
    measure: Option<i64>,
) -> Rest {
    if gap < Rational::from_integer(1) {
        for candidate in std::iter::once(running).chain(measure) {
            if lcm(candidate, *gap.denom()) == candidate {
                return ticks_of(gap, candidate);
            }
        }
        if let Some(following) = following {
            let shared = lcm(*gap.denom(), *split_whole(following).1.denom());
            if shared <= MAX_SHARED_DIVISOR {
                return ticks_of(gap, shared);
            }
        }
    }

    let (whole, fraction) = split_whole(gap);
    Rest {
        divisor: *fraction.denom(),
        ticks: *fraction.numer(),
        whole,
    }
}

#[derive(Default)]
struct Slot<'a> {
    tempo: Option<f64>,
    notes: Vec<&'a Note>,
}

fn render_tap(tap: &Tap) -> String {
    let mut token = tap.lane.display().to_string();
    if tap.is_break {
        token.push('b');
    }
    if tap.is_ex {
        token.push('x');
    }
    if tap.is_star {
        token.push('$');
    }
    token
}

fn render_slide_leg(
    slide: &Slide,
    tempo: f64,
    max_denominator: i64,
) -> Result<String, ChartError> {
    let (symbol, reflect) = pattern_to_symbol(slide.pattern, slide.start_lane, slide.end_lane);
    let mut token = symbol.to_string();
    if let Some(reflect) = reflect {
        token.push_str(&reflect.display().to_string());
    }
    token.push_str(&slide.end_lane.display().to_string());

    let max_denominator = max_denominator * SLIDE_DENOMINATOR_FACTOR;
    if slide.has_default_delay() {
        token.push_str(&duration_token(slide.duration, max_denominator));
    } else {
        let delay = snap(slide.delay, max_denominator);
        let default_delay = from_position(Position::from_measures(DEFAULT_SLIDE_DELAY));
        let scale = if delay <= Rational::new(1, 400) {
            Rational::from_integer(100)
        } else {
            default_delay / delay
        };
        let equivalent = (tempo * to_f64(scale) * 10_000.0).round() / 10_000.0;
        let length = limit_denominator(snap(slide.duration, max_denominator) * scale, max_denominator);
        token.push_str(&format!(
            "[{}#{}:{}]",
            format_decimal(equivalent),
            length.denom(),
            length.numer()
        ));
    }
    Ok(token)
}

fn render_body(
    slot: &Slot,
    tempo_curve: &TempoCurve,
    position: Position,
    max_denominator: i64,
) -> Result<String, ChartError> {
    let mut taps = Vec::new();
    let mut holds = Vec::new();
    let mut touch_taps = Vec::new();
    let mut touch_holds = Vec::new();
    let mut slides: BTreeMap<Lane, Vec<&Slide>> = BTreeMap::new();
    let mut stars: BTreeMap<Lane, &Tap> = BTreeMap::new();

    for note in &slot.notes {
        match note {
            Note::Tap(tap) if tap.is_star => {
                stars.entry(tap.lane).or_insert(tap);
            }
            Note::Tap(tap) => taps.push(render_tap(tap)),
            Note::Hold(hold) => {
                let mut token = format!("{}", hold.lane.display());
                if hold.is_ex {
                    token.push('x');
                }
                token.push('h');
                if hold.duration != Position::ZERO {
                    token.push_str(&duration_token(
                        hold.duration,
                        max_denominator * HOLD_DENOMINATOR_FACTOR,
                    ));
                }
                holds.push(token);
            }
            Note::TouchTap(touch) => {
                let mut token = format!("{}{}", touch.zone.letter(), touch.lane + 1);
                if touch.is_firework {
                    token.push('f');
                }
                touch_taps.push(token);
            }
            Note::TouchHold(touch) => {
                let mut token = format!("{}{}h", touch.zone.letter(), touch.lane + 1);
                if touch.is_firework {
                    token.push('f');
                }
                if touch.duration != Position::ZERO {
                    token.push_str(&duration_token(
                        touch.duration,
                        max_denominator * HOLD_DENOMINATOR_FACTOR,
                    ));
                }
                touch_holds.push(token);
            }
            Note::Slide(slide) => slides.entry(slide.start_lane).or_default().push(slide),
        }
    }

    // Stars that launch slides are written as the slide head
    let mut lone_stars = Vec::new();
    for (lane, star) in &stars {
        if !slides.contains_key(lane) {
            lone_stars.push(render_tap(star));
        }
    }
    taps.extend(lone_stars);

    let tempo = match slot.tempo {
        Some(bpm) => bpm,
        None => tempo_curve.tempo_at(position)?,
    };
    let mut slide_tokens = Vec::new();
    for (lane, mut group) in slides {
        group.sort_by_key(|s| (s.end_lane, s.pattern, s.duration, s.delay));
        let mut token = lane.display().to_string();
        match stars.get(&lane) {
            Some(star) => {
                if star.is_break {
                    token.push('b');
                }
                if star.is_ex {
                    token.push('x');
                }
            }
            None => token.push('?'),
        }
        let legs = group
            .iter()
            .map(|slide| render_slide_leg(slide, tempo, max_denominator))
            .collect::<Result<Vec<_>, _>>()?;
        token.push_str(&legs.join("*"));
        slide_tokens.push(token);
    }

    let tokens: Vec<String> = taps
        .into_iter()
        .chain(holds)
        .chain(touch_taps)
        .chain(touch_holds)
        .chain(slide_tokens)
        .collect();
    Ok(tokens.join("/"))
}

/// Render a chart as DSL text
///
/// Fractional positions are approximated with denominators up to `max_denominator`.
/// Notes must start at or after measure 1, where the DSL timeline begins.
pub fn render_dsl(chart: &Chart, max_denominator: u32) -> Result<String, ChartError> {
    let tempo_curve = chart.tempo();
    tempo_curve.validate()?;
    let max_denominator = i64::from(max_denominator.max(1));

    let mut slots: BTreeMap<Rational, Slot> = BTreeMap::new();
    slots.entry(Rational::from_integer(1)).or_default().tempo =
        Some(tempo_curve.tempo_at(Position::ONE)?);
    for point in tempo_curve.points() {
        if point.position > Position::ONE {
            slots
                .entry(snap(point.position, max_denominator))
                .or_default()
                .tempo = Some(point.bpm);
        }
    }
    for note in chart.notes() {
        if note.position() < Position::ONE {
            return Err(ChartError::invalid_note(
                note.position().as_measures(),
                "notes before measure 1 cannot be written",
            ));
        }
        slots
            .entry(snap(note.position(), max_denominator))
            .or_default()
            .notes
            .push(note);
    }

    let end = chart
        .notes()
        .iter()
        .map(|note| note_end(note, max_denominator))
        .fold(Rational::from_integer(1), Rational::max);
    let positions: Vec<Rational> = slots.keys().copied().collect();

    let mut measures: BTreeMap<i64, Vec<Rational>> = BTreeMap::new();
    for position in &positions {
        measures
            .entry(split_whole(*position).0)
            .or_default()
            .push(*position);
    }
    let measure_divisors: BTreeMap<i64, Option<i64>> = measures
        .iter()
        .map(|(whole, offsets)| (*whole, measure_divisor(offsets)))
        .collect();

    let mut text = String::new();
    let mut running = i64::from(DEFAULT_DIVISOR);
    let mut line_measure = 1;
    for (i, position) in positions.iter().enumerate() {
        let (whole, _) = split_whole(*position);
        if whole > line_measure {
            text.push('\n');
            line_measure = whole;
        }

        let next = positions.get(i + 1).copied().unwrap_or(end.max(*position));
        let following = positions.get(i + 2).map(|after| *after - next);
        let measure = measure_divisors.get(&whole).copied().flatten();
        let rest = choose_rest(next - *position, following, running, measure);

        let slot = &slots[position];
        if let Some(bpm) = slot.tempo {
            text.push_str(&format!("({})", format_decimal(bpm)));
        }
        let divisor = if rest.ticks > 0 { rest.divisor } else { 1 };
        if (rest.ticks > 0 || rest.whole > 0) && divisor != running {
            text.push_str(&format!("{{{}}}", divisor));
            running = divisor;
        }
        text.push_str(&render_body(
            slot,
            tempo_curve,
            to_position(*position),
            max_denominator,
        )?);
        text.push(',');

        let first_steps = if rest.ticks > 0 { rest.ticks } else { rest.whole };
        for _ in 1..first_steps {
            text.push(',');
        }
        if rest.ticks > 0 && rest.whole > 0 {
            text.push_str("{1}");
            running = 1;
            for _ in 0..rest.whole {
                text.push(',');
            }
        }
    }
    text.push_str(END_MARKER);

    debug!(
        "rendered {} fragments with {} notes",
        positions.len(),
        chart.notes().len()
    );
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parser::ParserSession;
    use crate::note::{Hold, SlidePattern, TouchHold, TouchZone};
    use crate::time::{Epoch, TempoPoint};

    fn at(m: f64) -> Position {
        Position::from_measures(m)
    }

    fn lane(i: u8) -> Lane {
        Lane::new(i).unwrap()
    }

    fn parse(text: &str) -> Chart {
        ParserSession::new(Some(2)).unwrap().parse(text).unwrap()
    }

    fn chart_at(bpm: f64) -> Chart {
        let mut chart = Chart::new(Epoch::One);
        chart.set_tempo(Position::ONE, bpm).unwrap();
        chart
    }

    #[test]
    fn test_single_tap() {
        let mut chart = chart_at(120.0);
        chart.add_tap(Tap::new(at(1.0), lane(0)).unwrap());
        assert_eq!(render_dsl(&chart, 1000).unwrap(), "(120)1,E");
    }

    #[test]
    fn test_running_divisor_is_reused() {
        let mut chart = chart_at(120.0);
        for (m, l) in [(1.0, 0), (1.25, 1), (1.5, 2), (1.75, 3), (2.0, 4)] {
            chart.add_tap(Tap::new(at(m), lane(l)).unwrap());
        }
        assert_eq!(render_dsl(&chart, 1000).unwrap(), "(120)1,2,3,4,\n5,E");
    }

    #[test]
    fn test_measure_shares_divisor() {
        let mut chart = chart_at(120.0);
        chart.add_tap(Tap::new(at(1.0), lane(0)).unwrap());
        chart.add_tap(Tap::new(at(1.125), lane(1)).unwrap());
        chart.add_tap(Tap::new(at(1.5), lane(2)).unwrap());
        assert_eq!(render_dsl(&chart, 1000).unwrap(), "(120){8}1,2,,,3,E");
    }

    #[test]
    fn test_one_measure_gap_is_a_whole_rest() {
        let mut chart = chart_at(120.0);
        chart.add_tap(Tap::new(at(1.0), lane(0)).unwrap());
        chart.add_tap(Tap::new(at(2.0), lane(1)).unwrap());
        assert_eq!(render_dsl(&chart, 1000).unwrap(), "(120){1}1,\n2,E");
    }

    #[test]
    fn test_fine_grid_keeps_small_divisors() {
        let chart = parse("(120){384}1,,2,,,3,{3}4,5,E");
        let text = render_dsl(&chart, 1000).unwrap();
        let expected = format!(
            "(120){{192}}1,{{128}}2,{{384}}3,4,{}5,E",
            ",".repeat(127)
        );
        assert_eq!(text, expected);
        assert_eq!(parse(&text).sorted_notes(), chart.sorted_notes());
    }

    #[test]
    fn test_equivalent_tempo_is_stable() {
        let chart = parse("(180)2-6[160#4:1],E");
        let text = render_dsl(&chart, 1000).unwrap();
        assert_eq!(text, "(180){16}2-6[160#4:1],,,,,,,,,E");
        assert_eq!(render_dsl(&parse(&text), 1000).unwrap(), text);
    }

    #[test]
    fn test_short_hold_uses_wider_bound() {
        let mut chart = chart_at(120.0);
        chart.add_hold(Hold::new(at(1.0), lane(0), Position::from_units(5)).unwrap());
        let text = render_dsl(&chart, 1000).unwrap();
        assert_eq!(text, "(120)1h[1819:1],E");
        match &parse(&text).notes()[0] {
            Note::Hold(hold) => assert_eq!(hold.duration, Position::from_units(5)),
            _ => panic!("Expected Hold"),
        }
    }

    #[test]
    fn test_gap_across_measures() {
        let mut chart = chart_at(120.0);
        chart.add_tap(Tap::new(at(1.75), lane(0)).unwrap());
        chart.add_tap(Tap::new(at(3.5), lane(1)).unwrap());
        assert_eq!(
            render_dsl(&chart, 1000).unwrap(),
            "(120),,,1,,,{1},\n2,E"
        );
    }

    #[test]
    fn test_whole_measure_rests() {
        let mut chart = chart_at(120.0);
        chart.add_tap(Tap::new(at(1.0), lane(0)).unwrap());
        chart.add_tap(Tap::new(at(3.0), lane(1)).unwrap());
        assert_eq!(render_dsl(&chart, 1000).unwrap(), "(120){1}1,,\n2,E");
    }

    #[test]
    fn test_trailing_hold_gets_rests() {
        let mut chart = chart_at(120.0);
        chart.add_hold(Hold::new(at(1.0), lane(0), at(0.5)).unwrap());
        assert_eq!(render_dsl(&chart, 1000).unwrap(), "(120)1h[2:1],,E");
    }

    #[test]
    fn test_tempo_change_fragment() {
        let mut chart = chart_at(120.0);
        chart.set_tempo(at(1.5), 180.5).unwrap();
        chart.add_tap(Tap::new(at(1.5), lane(2)).unwrap());
        assert_eq!(render_dsl(&chart, 1000).unwrap(), "(120),,(180.5)3,E");
    }

    #[test]
    fn test_star_with_chained_slides() {
        let mut chart = chart_at(120.0);
        chart.add_tap(Tap {
            is_break: true,
            ..Tap::star(at(1.0), lane(0)).unwrap()
        });
        chart.add_slide(
            Slide::with_default_delay(at(1.0), lane(0), lane(4), SlidePattern::STRAIGHT, at(0.25))
                .unwrap(),
        );
        chart.add_slide(
            Slide::with_default_delay(at(1.0), lane(0), lane(2), SlidePattern::CIRCLE_CW, at(0.25))
                .unwrap(),
        );
        assert_eq!(render_dsl(&chart, 1000).unwrap(), "(120)1b^3[4:1]*-5[4:1],,E");
    }

    #[test]
    fn test_slide_without_star_is_tapless() {
        let mut chart = chart_at(120.0);
        chart.add_slide(
            Slide::with_default_delay(at(1.0), lane(1), lane(5), SlidePattern::THUNDER_S, at(0.5))
                .unwrap(),
        );
        assert!(render_dsl(&chart, 1000).unwrap().starts_with("(120)2?s6[2:1],"));
    }

    #[test]
    fn test_non_default_delay_uses_equivalent_tempo() {
        let mut chart = chart_at(120.0);
        chart.add_slide(
            Slide::new(at(1.0), lane(0), lane(4), SlidePattern::STRAIGHT, at(0.125), at(0.125))
                .unwrap(),
        );
        assert!(render_dsl(&chart, 1000).unwrap().starts_with("(120)1?-5[240#4:1],"));
    }

    #[test]
    fn test_touch_and_lone_star() {
        let mut chart = chart_at(120.0);
        chart.add_tap(Tap::star(at(1.0), lane(3)).unwrap());
        chart.add_touch_hold(TouchHold {
            is_firework: true,
            ..TouchHold::new(at(1.0), TouchZone::C, 0, at(0.25)).unwrap()
        });
        assert_eq!(render_dsl(&chart, 1000).unwrap(), "(120)4$/C1hf[4:1],E");
    }

    #[test]
    fn test_opposite_circle_serializes_by_screen_direction() {
        let mut chart = chart_at(120.0);
        chart.add_slide(
            Slide::with_default_delay(at(1.0), lane(0), lane(4), SlidePattern::CIRCLE_CW, at(0.25))
                .unwrap(),
        );
        assert!(render_dsl(&chart, 1000).unwrap().starts_with("(120)1?>5[4:1],"));
    }

    #[test]
    fn test_note_before_first_measure_rejected() {
        let mut chart = chart_at(120.0);
        chart.add_tap(Tap::new(at(0.5), lane(0)).unwrap());
        assert!(matches!(
            render_dsl(&chart, 1000),
            Err(ChartError::InvalidNote { .. })
        ));
    }

    #[test]
    fn test_tempo_before_lead_in_end_is_emitted_first() {
        let mut chart = Chart::new(Epoch::Zero);
        chart.tempo_mut().insert(TempoPoint::new(Position::ZERO, 90.0).unwrap());
        chart.add_tap(Tap::new(at(1.0), lane(0)).unwrap());
        assert_eq!(render_dsl(&chart, 1000).unwrap(), "(90)1,E");
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(120.0), "120");
        assert_eq!(format_decimal(180.5), "180.5");
        assert_eq!(format_decimal(133.33333), "133.3333");
    }
}
