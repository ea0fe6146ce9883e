//! End-to-end tests for the segmentation pipeline

use chrono::{DateTime, Duration, FixedOffset};
use location_segments::{
    refine_segments, Geofence, LocationSegmenter, Sample, SegmentLabel, SegmentationConfig,
    SegmentationResult,
};

const HOME: (f64, f64) = (52.00, 4.00);
const WORK: (f64, f64) = (52.10, 4.10);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ts(minute: i64) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2024-03-01T08:00:00+00:00").unwrap()
        + Duration::minutes(minute)
}

fn at(minute: i64, (lat, lon): (f64, f64)) -> Sample {
    Sample::new(format!("s{minute}"), ts(minute), lat, lon)
}

fn lost(minute: i64) -> Sample {
    Sample::no_fix(format!("s{minute}"), ts(minute))
}

fn segmenter() -> LocationSegmenter {
    LocationSegmenter::new(SegmentationConfig {
        geofences: vec![
            Geofence::new("home", HOME.0, HOME.1, 100.0),
            Geofence::new("work", WORK.0, WORK.1, 100.0),
        ],
        ..SegmentationConfig::default()
    })
    .unwrap()
}

/// (label, start minute, end minute) of every final segment.
fn spans(result: &SegmentationResult) -> Vec<(String, i64, i64)> {
    result
        .segments
        .iter()
        .map(|s| {
            (
                s.label.to_string(),
                (s.start - ts(0)).num_minutes(),
                (s.end - ts(0)).num_minutes(),
            )
        })
        .collect()
}

/// Final segments of every day cover that day's active periods exactly.
fn assert_tiles(result: &SegmentationResult) {
    for (date, periods) in &result.active_periods {
        let day: Vec<_> = result.segments_on(*date).collect();
        let mut pieces = day.iter().peekable();

        for period in periods.iter().filter(|p| p.end > p.start) {
            let mut cursor = period.start;
            while let Some(segment) = pieces.peek() {
                if segment.start >= period.end {
                    break;
                }
                assert_eq!(segment.start, cursor, "hole or overlap on {date} at {}", cursor);
                assert!(segment.end > segment.start);
                assert!(segment.end <= period.end, "segment leaks out of its active period");
                cursor = segment.end;
                pieces.next();
            }
            assert_eq!(cursor, period.end, "active period on {date} not covered");
        }
        assert!(pieces.next().is_none(), "segment outside every active period on {date}");
    }
}

#[test]
fn test_invalid_run_at_29_minutes_keeps_place() {
    init_logging();
    let samples = vec![at(0, HOME), lost(29), at(30, HOME)];
    let result = segmenter().segment(&samples);

    // Sparse samples leave only short active periods, but no boundary appears
    assert_eq!(result.stats.raw_segments, 1);
    assert_eq!(result.stats.dropped_segments, 0);
    assert!(result.segments.iter().all(|s| s.label.as_str() != "invalid_gps"));
}

#[test]
fn test_sparse_invalid_run_threshold() {
    init_logging();
    // one-minute minimum so the single-minute spans around the lost fix survive
    let segmenter = LocationSegmenter::new(SegmentationConfig {
        geofences: vec![
            Geofence::new("home", HOME.0, HOME.1, 100.0),
            Geofence::new("work", WORK.0, WORK.1, 100.0),
        ],
        min_segment_duration_secs: 60,
        ..SegmentationConfig::default()
    })
    .unwrap();

    let result = segmenter.segment(&[at(0, HOME), lost(29), at(30, HOME)]);
    assert_eq!(result.stats.raw_segments, 1);
    assert_eq!(spans(&result), vec![("home".to_string(), 29, 30)]);

    let result = segmenter.segment(&[at(0, HOME), lost(31), at(32, HOME)]);
    assert_eq!(result.stats.raw_segments, 2);
    assert_eq!(spans(&result), vec![("invalid_gps".to_string(), 31, 32)]);
    assert_tiles(&result);
}

#[test]
fn test_invalid_run_boundary() {
    init_logging();

    // Dense invalid run ending exactly at the 30 minute threshold
    let mut samples = vec![at(0, HOME)];
    samples.extend((1..=30).map(lost));
    samples.extend((31..=40).map(|m| at(m, HOME)));
    let result = segmenter().segment(&samples);
    assert_eq!(spans(&result), vec![("home".to_string(), 0, 40)]);

    // One minute longer flips to invalid GPS
    let mut samples = vec![at(0, HOME)];
    samples.extend((1..=40).map(lost));
    samples.extend((41..=50).map(|m| at(m, HOME)));
    let result = segmenter().segment(&samples);
    assert_eq!(
        spans(&result),
        vec![
            ("home".to_string(), 0, 31),
            ("invalid_gps".to_string(), 31, 41),
            ("home".to_string(), 41, 50),
        ]
    );
    assert_tiles(&result);
}

#[test]
fn test_single_invalid_sample_between_fixes() {
    let mut samples: Vec<Sample> = (0..10).map(|m| at(m, HOME)).collect();
    samples.push(lost(10));
    samples.extend((11..=20).map(|m| at(m, HOME)));
    let result = segmenter().segment(&samples);
    assert_eq!(spans(&result), vec![("home".to_string(), 0, 20)]);
}

#[test]
fn test_first_sample_override() {
    let mut samples: Vec<Sample> = (0..=5).map(lost).collect();
    samples.extend((6..=20).map(|m| at(m, WORK)));
    let result = segmenter().segment(&samples);
    assert_eq!(
        spans(&result),
        vec![("home".to_string(), 0, 6), ("work".to_string(), 6, 20)]
    );
}

#[test]
fn test_transit() {
    // ~200 m north every minute, away from every geofence
    let samples: Vec<Sample> = (0..=10)
        .map(|m| at(m, (52.05 + m as f64 * 0.0018, 4.05)))
        .collect();
    let result = segmenter().segment(&samples);

    let transit: Vec<_> = result
        .segments
        .iter()
        .filter(|s| s.label == SegmentLabel::InTransit)
        .collect();
    assert_eq!(transit.len(), 1);
    assert_eq!(transit[0].start, ts(1));
    assert_eq!(transit[0].end, ts(10));
    assert_tiles(&result);
}

#[test]
fn test_geofence_tie_break_ignores_definition_order() {
    let big = Geofence::new("park", 52.0, 4.0, 500.0);
    let small = Geofence::new("cafe", 52.002, 4.0, 300.0);

    for geofences in [
        vec![big.clone(), small.clone()],
        vec![small.clone(), big.clone()],
    ] {
        let segmenter = LocationSegmenter::new(SegmentationConfig {
            geofences,
            ..SegmentationConfig::default()
        })
        .unwrap();
        let samples: Vec<Sample> = (0..=10).map(|m| at(m, (52.0015, 4.0))).collect();
        let result = segmenter.segment(&samples);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].label.as_str(), "cafe");
    }
}

#[test]
fn test_tiling_over_mixed_day() {
    init_logging();
    let mut samples: Vec<Sample> = (0..=20).map(|m| at(m, HOME)).collect();
    // sensor off for 10 minutes, then work with a short excursion
    samples.extend((30..=60).map(|m| at(m, WORK)));
    samples.push(at(61, (52.05, 4.05)));
    samples.push(at(62, (52.05, 4.05)));
    samples.extend((63..=90).map(|m| at(m, WORK)));
    // lone sample much later keeps the work segment open
    samples.push(at(200, WORK));
    // GPS lost long after the last fix
    samples.extend((300..=320).map(lost));

    let result = segmenter().segment(&samples);
    assert_tiles(&result);

    assert_eq!(
        spans(&result),
        vec![
            ("home".to_string(), 0, 20),
            ("work".to_string(), 30, 90),
            ("invalid_gps".to_string(), 300, 320),
        ]
    );
    // home closed at the first work sample, clipped back to the active period
    assert_eq!(result.segments[0].end_sample, "s20");
    assert!(result.stats.dropped_segments >= 2);
}

#[test]
fn test_gap_segments_fill_dropped_slivers() {
    // other for 4 minutes at the start of the period is too short to keep
    let mut samples: Vec<Sample> = (0..2).map(|m| at(m, (52.05, 4.05))).collect();
    samples.extend((4..=20).map(|m| at(m, WORK)));
    let result = segmenter().segment(&samples);
    assert_tiles(&result);
    assert_eq!(
        spans(&result),
        vec![("invalid".to_string(), 0, 4), ("work".to_string(), 4, 20)]
    );
    assert_eq!(result.stats.gap_segments, 1);
}

#[test]
fn test_refine_is_idempotent() {
    let mut samples: Vec<Sample> = (0..=20).map(|m| at(m, HOME)).collect();
    samples.extend((24..=26).map(|m| at(m, (52.05, 4.05))));
    samples.extend((27..=60).map(|m| at(m, WORK)));
    samples.extend((100..=130).map(|m| at(m, HOME)));

    let result = segmenter().segment(&samples);
    let again = refine_segments(result.segments.clone(), &result.active_periods);
    assert_eq!(again, result.segments);
}

#[test]
fn test_no_merge_across_midnight() {
    let late = DateTime::parse_from_rfc3339("2024-03-01T23:50:00+00:00").unwrap();
    let samples: Vec<Sample> = (0..=20)
        .map(|m| Sample::new(format!("n{m}"), late + Duration::minutes(m), HOME.0, HOME.1))
        .collect();
    let result = segmenter().segment(&samples);

    assert_eq!(result.stats.days, 2);
    assert_eq!(result.segments.len(), 2);
    assert_eq!(result.segments[0].end, late + Duration::minutes(9));
    assert_eq!(result.segments[1].start, late + Duration::minutes(10));
    assert_tiles(&result);
}

#[test]
fn test_empty_input() {
    let result = segmenter().segment(&[]);
    assert!(result.segments.is_empty());
    assert!(result.active_periods.is_empty());
}
