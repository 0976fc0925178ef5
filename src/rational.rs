//! Bounded-denominator rational approximation.

use crate::time::Position;
use num_rational::Ratio;

pub type Rational = Ratio<i64>;

/// Largest common grid denominator tried before any other
const GRID_LIMIT: i64 = 768;

/// Any denominator up to this is accepted once no grid denominator fits
const SMALL_DENOMINATOR: i64 = 64;

/// Closest fraction to `value` whose denominator is at most `max_denominator`
///
/// Walks the continued-fraction expansion and, at the bound, picks the better of
/// the last convergent and the best semiconvergent.
pub fn limit_denominator(value: Rational, max_denominator: i64) -> Rational {
    let max_denominator = max_denominator.max(1);
    if *value.denom() <= max_denominator {
        return value;
    }

    let (mut p0, mut q0, mut p1, mut q1) = (0i64, 1i64, 1i64, 0i64);
    let (mut n, mut d) = (*value.numer(), *value.denom());
    loop {
        let a = n.div_euclid(d);
        let q2 = q0 + a * q1;
        if q2 > max_denominator {
            break;
        }
        (p0, q0, p1, q1) = (p1, q1, p0 + a * p1, q2);
        (n, d) = (d, n - a * d);
        if d == 0 {
            break;
        }
    }

    let k = (max_denominator - q0) / q1;
    let bound1 = Rational::new(p0 + k * p1, q0 + k * q1);
    let bound2 = Rational::new(p1, q1);
    if distance(bound2, value) <= distance(bound1, value) {
        bound2
    } else {
        bound1
    }
}

fn distance(a: Rational, b: Rational) -> Rational {
    if a > b {
        a - b
    } else {
        b - a
    }
}

/// Denominators of the usual chart grids: powers of two and three times powers of two
fn grid_denominators(limit: i64) -> Vec<i64> {
    let mut denominators = Vec::new();
    let mut power = 1;
    while power <= limit {
        denominators.push(power);
        if power * 3 <= limit {
            denominators.push(power * 3);
        }
        power *= 2;
    }
    denominators.sort_unstable();
    denominators
}

/// Some `k / denominator` inside `[lo, hi]`
fn fit(lo: Rational, hi: Rational, denominator: i64) -> Option<Rational> {
    let scale = Rational::from_integer(denominator);
    let k = (lo * scale).ceil();
    (k <= hi * scale).then(|| k / scale)
}

/// Fraction with the smallest denominator inside `[lo, hi]`
///
/// Stern-Brocot descent through the continued fractions of both ends.
pub fn simplest_between(lo: Rational, hi: Rational) -> Rational {
    let whole = lo.floor();
    if lo.ceil() <= hi {
        return lo.ceil();
    }
    let (lo, hi) = (lo - whole, hi - whole);
    whole + simplest_between(hi.recip(), lo.recip()).recip()
}

/// Recover the fraction a rounded position most likely came from
///
/// Every fraction within half a unit of `position` rounds to it. Grid
/// denominators are tried first, smallest first, then any small denominator, then
/// the simplest fraction in range. Above `max_denominator` the closest bounded
/// approximation is used instead.
pub fn snap(position: Position, max_denominator: i64) -> Rational {
    let max_denominator = max_denominator.max(1);
    let (whole, fraction) = split_whole(from_position(position));
    let tolerance = Rational::new(1, 2 * Position::UNITS_PER_MEASURE);
    let (lo, hi) = (fraction - tolerance, fraction + tolerance);

    let snapped = grid_denominators(max_denominator.min(GRID_LIMIT))
        .into_iter()
        .chain(1..=max_denominator.min(SMALL_DENOMINATOR))
        .find_map(|denominator| fit(lo, hi, denominator))
        .or_else(|| {
            let simplest = simplest_between(lo, hi);
            (*simplest.denom() <= max_denominator).then_some(simplest)
        })
        .unwrap_or_else(|| limit_denominator(fraction, max_denominator));
    Rational::from_integer(whole) + snapped
}

/// Floating-point value of a fraction
pub fn to_f64(value: Rational) -> f64 {
    *value.numer() as f64 / *value.denom() as f64
}

/// Exact value of a position in measures
pub fn from_position(position: Position) -> Rational {
    Rational::new(position.units(), Position::UNITS_PER_MEASURE)
}

/// Nearest position to a rational number of measures
pub fn to_position(value: Rational) -> Position {
    let scaled = value * Rational::from_integer(Position::UNITS_PER_MEASURE);
    Position::from_units(scaled.round().to_integer())
}

/// Least common multiple
pub fn lcm(a: i64, b: i64) -> i64 {
    num_integer::lcm(a, b)
}

/// Split into whole part and non-negative fractional part
pub fn split_whole(value: Rational) -> (i64, Rational) {
    let whole = value.floor();
    (whole.to_integer(), value - whole)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i64, d: i64) -> Rational {
        Rational::new(n, d)
    }

    #[test]
    fn test_exact_fraction_unchanged() {
        assert_eq!(limit_denominator(r(3, 8), 1000), r(3, 8));
    }

    #[test]
    fn test_approximates_thirds() {
        // 0.3333 in ten-thousandths
        assert_eq!(limit_denominator(r(3333, 10_000), 64), r(1, 3));
        assert_eq!(limit_denominator(r(6667, 10_000), 64), r(2, 3));
    }

    #[test]
    fn test_known_pi_approximations() {
        let pi = r(314_159_265, 100_000_000);
        assert_eq!(limit_denominator(pi, 10), r(22, 7));
        assert_eq!(limit_denominator(pi, 100), r(311, 99));
        assert_eq!(limit_denominator(pi, 1000), r(355, 113));
    }

    #[test]
    fn test_split_whole() {
        assert_eq!(split_whole(r(9, 4)), (2, r(1, 4)));
        assert_eq!(split_whole(r(2, 1)), (2, r(0, 1)));
    }

    #[test]
    fn test_position_conversion() {
        let p = Position::from_measures(1.125);
        assert_eq!(from_position(p), r(9, 8));
        assert_eq!(to_position(r(4, 3)), Position::from_units(13_333));
    }

    #[test]
    fn test_snap_recovers_grid_fractions() {
        // 2/384 is stored as 0.0052, 47/384 as 0.1224
        assert_eq!(snap(Position::from_units(52), 1000), r(1, 192));
        assert_eq!(snap(Position::from_units(1224), 1000), r(47, 384));
        assert_eq!(snap(Position::from_units(26), 1000), r(1, 384));
        // 1/32 rounds up from 312.5
        assert_eq!(snap(Position::from_measures(1.0 / 32.0), 1000), r(1, 32));
        assert_eq!(snap(Position::from_measures(2.0 + 1.0 / 3.0), 1000), r(7, 3));
    }

    #[test]
    fn test_snap_small_tuplets() {
        assert_eq!(snap(Position::from_measures(0.2), 1000), r(1, 5));
        assert_eq!(snap(Position::from_measures(3.0 / 7.0), 1000), r(3, 7));
        assert_eq!(snap(Position::from_measures(1.0 / 20.0), 1000), r(1, 20));
    }

    #[test]
    fn test_snap_stays_within_half_a_unit() {
        for units in [1237, 4286, 33] {
            let snapped = snap(Position::from_units(units), 1000);
            assert_eq!(to_position(snapped), Position::from_units(units));
            assert!(*snapped.denom() <= 1000);
        }
    }

    #[test]
    fn test_snap_respects_bound() {
        assert_eq!(snap(Position::from_units(52), 100), r(1, 100));
    }

    #[test]
    fn test_simplest_between() {
        assert_eq!(simplest_between(r(3, 10), r(4, 10)), r(1, 3));
        assert_eq!(simplest_between(r(1, 2), r(3, 2)), r(1, 1));
        assert_eq!(simplest_between(r(103, 20_000), r(105, 20_000)), r(1, 191));
    }

    #[test]
    fn test_lcm() {
        assert_eq!(lcm(4, 6), 12);
        assert_eq!(lcm(16, 4), 16);
    }
}
