//! # Slide Pattern Codec
//!
//! Maps numeric slide pattern ids to the DSL's symbolic notation and back.
//!
//! Most ids have a fixed symbol. Circle slides (ids 2 and 3) and bent slides
//! (ids 11 and 12) carry a rotation in the id, while the DSL writes a symbol
//! whose meaning depends on where the slide starts:
//! - `^` takes the short way round, so the direction follows from the lanes.
//! - `>` and `<` name a screen direction; which rotation that is depends on whether
//!   the start lane is in the top half of the ring.
//! - `V` names a reflection lane two steps from the start.
//!
//! Inferring a direction from two lanes fails when they are four steps apart or
//! identical. Such cases raise [`ChartError::AmbiguousDirection`] instead of guessing.

use crate::error::ChartError;
use crate::note::{Lane, SlidePattern};

/// Lanes whose `>` symbol means clockwise
const TOP_LANES: [u8; 4] = [0, 1, 6, 7];

fn is_top(lane: Lane) -> bool {
    TOP_LANES.contains(&lane.index())
}

/// Steps from `start` to `end` going round in one direction
pub fn slide_distance(start: Lane, end: Lane, clockwise: bool) -> u8 {
    let (from, to) = if clockwise {
        (start.index(), end.index())
    } else {
        (end.index(), start.index())
    };
    (to + Lane::COUNT - from) % Lane::COUNT
}

/// Whether the short way from `start` to `end` is clockwise
pub fn is_clockwise(start: Lane, end: Lane) -> Result<bool, ChartError> {
    match slide_distance(start, end, true) {
        1..=3 => Ok(true),
        5..=7 => Ok(false),
        _ => Err(ChartError::AmbiguousDirection {
            start: start.index(),
            end: end.index(),
        }),
    }
}

/// DSL symbol for a pattern id, with the reflection lane for `V` slides
pub fn pattern_to_symbol(
    pattern: SlidePattern,
    start: Lane,
    end: Lane,
) -> (&'static str, Option<Lane>) {
    match pattern {
        SlidePattern::CIRCLE_CCW | SlidePattern::CIRCLE_CW => {
            let clockwise = pattern == SlidePattern::CIRCLE_CW;
            let distance = slide_distance(start, end, clockwise);
            // Full circles and long ways round are written by screen direction
            let symbol = if (1..=3).contains(&distance) {
                "^"
            } else if is_top(start) == clockwise {
                ">"
            } else {
                "<"
            };
            (symbol, None)
        }
        SlidePattern::BENT_CCW => ("V", Some(start.rotate(-2))),
        SlidePattern::BENT_CW => ("V", Some(start.rotate(2))),
        SlidePattern::STRAIGHT => ("-", None),
        SlidePattern::CURVE_P => ("p", None),
        SlidePattern::CURVE_Q => ("q", None),
        SlidePattern::THUNDER_S => ("s", None),
        SlidePattern::THUNDER_Z => ("z", None),
        SlidePattern::V_SHAPE => ("v", None),
        SlidePattern::LOOP_PP => ("pp", None),
        SlidePattern::LOOP_QQ => ("qq", None),
        _ => ("w", None),
    }
}

/// Pattern id for a DSL symbol
///
/// `reflect` is required for `V` and ignored otherwise.
pub fn symbol_to_pattern(
    symbol: &str,
    start: Lane,
    end: Lane,
    reflect: Option<Lane>,
) -> Result<SlidePattern, ChartError> {
    let pattern = match symbol {
        "-" => SlidePattern::STRAIGHT,
        "p" => SlidePattern::CURVE_P,
        "q" => SlidePattern::CURVE_Q,
        "s" => SlidePattern::THUNDER_S,
        "z" => SlidePattern::THUNDER_Z,
        "v" => SlidePattern::V_SHAPE,
        "pp" => SlidePattern::LOOP_PP,
        "qq" => SlidePattern::LOOP_QQ,
        "w" => SlidePattern::FAN,
        "^" => {
            if is_clockwise(start, end)? {
                SlidePattern::CIRCLE_CW
            } else {
                SlidePattern::CIRCLE_CCW
            }
        }
        ">" => {
            if is_top(start) {
                SlidePattern::CIRCLE_CW
            } else {
                SlidePattern::CIRCLE_CCW
            }
        }
        "<" => {
            if is_top(start) {
                SlidePattern::CIRCLE_CCW
            } else {
                SlidePattern::CIRCLE_CW
            }
        }
        "V" => {
            let reflect = reflect
                .ok_or_else(|| ChartError::malformed("`V` slide needs a reflection lane"))?;
            if is_clockwise(start, reflect)? {
                SlidePattern::BENT_CW
            } else {
                SlidePattern::BENT_CCW
            }
        }
        other => {
            return Err(ChartError::malformed(format!(
                "unknown slide pattern `{}`",
                other
            )))
        }
    };
    Ok(pattern)
}
