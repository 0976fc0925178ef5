//! Integration tests for maichart
//!
//! Tests full conversions between the DSL, tick and fixed-tempo formats.

use maichart::convert::{rebase, to_fixed_tempo};
use maichart::dsl::parse_document;
use maichart::formats::sdt::{self, SdtOptions};
use maichart::slide::{is_clockwise, pattern_to_symbol, symbol_to_pattern};
use maichart::{
    parse_dsl, parse_ticks, render_dsl, render_ticks, offset_chart, Chart, ChartError, Epoch,
    Hold, Lane, Location, Note, Offset, Position, Slide, SlidePattern, Tap, TempoCurve,
    TempoPoint,
};

fn at(m: f64) -> Position {
    Position::from_measures(m)
}

fn lane(i: u8) -> Lane {
    Lane::new(i).unwrap()
}

fn positions(chart: &Chart) -> Vec<Position> {
    chart.sorted_notes().iter().map(|n| n.position()).collect()
}

#[test]
fn test_seconds_under_constant_tempo() {
    let curve = TempoCurve::constant(120.0, Epoch::Zero).unwrap();
    assert_eq!(curve.position_to_seconds(at(1.0)).unwrap(), 2.0);
    assert_eq!(curve.position_to_seconds(at(2.0)).unwrap(), 4.0);
}

#[test]
fn test_tempo_change_does_not_alter_elapsed_time() {
    let curve = TempoCurve::from_points(
        vec![
            TempoPoint::new(at(0.0), 120.0).unwrap(),
            TempoPoint::new(at(1.0), 240.0).unwrap(),
        ],
        Epoch::Zero,
    );
    assert_eq!(curve.position_to_seconds(at(1.0)).unwrap(), 2.0);
    assert_eq!(curve.position_to_seconds(at(2.0)).unwrap(), 3.0);
}

#[test]
fn test_single_tap_scenario() {
    let result = parse_dsl("(120)1,E");
    assert!(result.is_ok(), "Should parse a single tap");
    let chart = result.unwrap();
    assert_eq!(chart.notes().len(), 1);
    match &chart.notes()[0] {
        Note::Tap(tap) => {
            assert_eq!(tap.position, at(1.0));
            assert_eq!(tap.lane, lane(0));
        }
        _ => panic!("Expected Tap"),
    }

    let text = render_dsl(&chart, 1000).unwrap();
    assert_eq!(text, "(120)1,E");
}

#[test]
fn test_ambiguous_slide_direction() {
    for start in 0..8 {
        let result = is_clockwise(lane(start), lane((start + 4) % 8));
        assert!(matches!(result, Err(ChartError::AmbiguousDirection { .. })));
    }
    assert!(matches!(
        symbol_to_pattern("^", lane(0), lane(4), None),
        Err(ChartError::AmbiguousDirection { start: 0, end: 4 })
    ));

    // Explicit screen-direction symbols still round trip
    let (symbol, _) = pattern_to_symbol(SlidePattern::CIRCLE_CW, lane(0), lane(4));
    assert_eq!(symbol, ">");
    assert_eq!(
        symbol_to_pattern(symbol, lane(0), lane(4), None).unwrap(),
        SlidePattern::CIRCLE_CW
    );
}

#[test]
fn test_unambiguous_pattern_serializes_across_the_screen() {
    let mut chart = Chart::new(Epoch::One);
    chart.set_tempo(at(1.0), 120.0).unwrap();
    chart.add_slide(
        Slide::with_default_delay(at(1.0), lane(0), lane(4), SlidePattern::THUNDER_S, at(0.25))
            .unwrap(),
    );
    let text = render_dsl(&chart, 1000).unwrap();
    assert!(text.starts_with("(120)1?s5[4:1],"), "got {}", text);

    let reparsed = parse_dsl(&text).unwrap();
    assert_eq!(reparsed.sorted_notes(), chart.sorted_notes());
}

#[test]
fn test_hold_across_tempo_change_to_fixed_tempo() {
    let mut chart = Chart::new(Epoch::Zero);
    chart.set_tempo(at(0.0), 120.0).unwrap();
    chart.set_tempo(at(1.0), 240.0).unwrap();
    chart.add_hold(Hold::new(at(0.0), lane(0), at(2.0)).unwrap());

    let fixed = to_fixed_tempo(&chart, Some(120.0)).unwrap();
    match &fixed.notes()[0] {
        Note::Hold(hold) => {
            assert_eq!(hold.position, at(0.0));
            assert!(hold.duration.approx_eq(at(1.5)), "got {}", hold.duration);
        }
        _ => panic!("Expected Hold"),
    }
}

#[test]
fn test_dsl_to_ticks_and_back() {
    let chart = parse_dsl("(120)1,2,3,4,(240)5h[2:1],3b-7[4:1],E").unwrap();
    assert_eq!(chart.notes().len(), 7);

    let lines = render_ticks(&chart, 384).unwrap();
    assert!(lines.contains(&"BPM\t0\t0\t120.000".to_string()));
    assert!(lines.contains(&"BPM\t2\t0\t240.000".to_string()));

    let ticks = parse_ticks(lines.iter().map(String::as_str)).unwrap();
    assert_eq!(positions(&ticks), positions(&chart));

    let dsl = rebase(&ticks, Epoch::One).unwrap();
    let text = render_dsl(&dsl, 1000).unwrap();
    let reparsed = parse_dsl(&text).unwrap();
    assert_eq!(reparsed.sorted_notes(), chart.sorted_notes());
}

#[test]
fn test_fine_tick_grid_to_dsl_uses_grid_divisors() {
    let lines = [
        "RESOLUTION\t384",
        "BPM\t0\t0\t120.000",
        "TAP\t1\t0\t0",
        "TAP\t1\t132\t1",
        "TAP\t1\t200\t2",
        "TAP\t2\t4\t3",
    ];
    let ticks = parse_ticks(lines).unwrap();
    let chart = rebase(&ticks, Epoch::One).unwrap();
    let text = render_dsl(&chart, 1000).unwrap();

    let expected = format!(
        "(120){{32}}1,{}{{96}}2,{}3,{}\n4,E",
        ",".repeat(10),
        ",".repeat(16),
        ",".repeat(46)
    );
    assert_eq!(text, expected);

    let reparsed = parse_dsl(&text).unwrap();
    assert_eq!(positions(&reparsed), positions(&chart));
}

#[test]
fn test_dsl_to_fixed_tempo_records() {
    let chart = parse_dsl("(120)1,2,(240)3,4,E").unwrap();
    let fixed = to_fixed_tempo(&chart, None).unwrap();
    assert_eq!(
        positions(&fixed),
        vec![at(1.0), at(1.25), at(1.5), at(1.625)]
    );

    let lines = sdt::render_records(&fixed, SdtOptions::default()).unwrap();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[3], "1.0000, 0.6250, 0.0625,  3,   1,   0,  0,  0, 0.0000,");

    let reparsed = sdt::parse_records(lines.iter().map(String::as_str), 120.0).unwrap();
    assert_eq!(positions(&reparsed), positions(&fixed));
}

#[test]
fn test_offset_in_seconds_keeps_lead_in_tempo() {
    let chart = parse_dsl("(120)1,E").unwrap();
    let shifted = offset_chart(&chart, "1s".parse::<Offset>().unwrap()).unwrap();
    assert_eq!(shifted.notes()[0].position(), at(1.5));
    assert_eq!(shifted.tempo().points()[0].position, at(1.0));
}

#[test]
fn test_parse_error_names_fragment() {
    let result = parse_dsl("(120)1,2,k,4,E");
    assert!(result.is_err(), "Should reject an unknown character");
    let err = result.unwrap_err();
    match err.location() {
        Some(Location::Fragment { index, text }) => {
            assert_eq!(*index, 2);
            assert_eq!(text, "k");
        }
        _ => panic!("Expected a fragment location"),
    }
    assert!(matches!(err.root(), ChartError::MalformedInput { .. }));
}

#[test]
fn test_document_to_ticks() {
    let document = parse_document(
        "&title=Demo\n&lv_3=10\n&inote_3=(150)\n{8}1,2,3,4,\n|| skipped\n5,6,7,8,\nE\n",
        Some(2),
    )
    .unwrap();
    assert_eq!(document.title, "Demo");
    let chart = &document.charts[&3];
    assert_eq!(chart.notes().len(), 8);

    let lines = render_ticks(chart, 384).unwrap();
    assert!(lines.contains(&"TAP\t1\t192\t4".to_string()));
}

#[test]
fn test_chart_json_round_trip() {
    let mut chart = Chart::new(Epoch::One);
    chart.set_tempo(at(1.0), 150.0).unwrap();
    chart.add_tap(Tap::star(at(1.0), lane(2)).unwrap());
    chart.add_slide(
        Slide::new(at(1.0), lane(2), lane(6), SlidePattern::BENT_CW, at(0.5), at(0.125)).unwrap(),
    );

    let json = serde_json::to_string(&chart).unwrap();
    assert!(json.contains("\"kind\":\"slide\""));
    let decoded: Chart = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, chart);
}
