//! # Segmentation Pipeline
//!
//! sorted samples → grouped by calendar day → per-day builder (consulting the
//! classifier) → raw segments + active periods → day-scoped merge → gap fill
//! per day → final segments.
//!
//! The pipeline is a pure batch computation over one user's sample history.
//! Independent users are the natural parallelism boundary (see
//! [`LocationSegmenter::segment_users_parallel`] with the `parallel` feature).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::info;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::builder::{build_day, group_by_day};
use crate::classifier::GeofenceIndex;
use crate::config::SegmentationConfig;
use crate::days::DayObjectFactory;
use crate::emitter::emit_segments;
use crate::error::Result;
use crate::gaps::fill_gaps;
use crate::ids::IdGenerator;
use crate::merge::merge_segments;
use crate::oced::{BehaviorEvent, OcedGraph, SensorEvent};
use crate::{ActivePeriod, Sample, Segment, SegmentLabel};

/// Counters describing one segmentation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentationStats {
    pub samples: usize,
    pub days: usize,
    /// Raw segments that survived the minimum-duration filter
    pub raw_segments: usize,
    /// Raw segments discarded as too short
    pub dropped_segments: usize,
    pub merged_segments: usize,
    /// Synthesized `invalid` segments in the final output
    pub gap_segments: usize,
}

/// Final segments of a run together with the active periods they tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentationResult {
    /// Final segments, sorted by start time
    pub segments: Vec<Segment>,
    /// Active periods per calendar day
    pub active_periods: BTreeMap<NaiveDate, Vec<ActivePeriod>>,
    pub stats: SegmentationStats,
}

impl SegmentationResult {
    /// Final segments starting on `date`.
    pub fn segments_on(&self, date: NaiveDate) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(move |s| s.date() == date)
    }
}

/// Merge and gap-fill segments against per-day active periods.
///
/// Applying this to its own output returns the same segments.
pub fn refine_segments(
    segments: Vec<Segment>,
    active_periods: &BTreeMap<NaiveDate, Vec<ActivePeriod>>,
) -> Vec<Segment> {
    let merged = merge_segments(segments);

    let mut by_day: BTreeMap<NaiveDate, Vec<Segment>> = BTreeMap::new();
    for segment in merged {
        by_day.entry(segment.date()).or_default().push(segment);
    }

    let mut finals = Vec::new();
    for (date, periods) in active_periods {
        let day_segments = by_day.get(date).map(Vec::as_slice).unwrap_or(&[]);
        finals.extend(fill_gaps(day_segments, periods));
    }
    finals.sort_by_key(|s| s.start);
    finals
}

/// Location segmentation over one user's samples, with validated configuration.
#[derive(Debug)]
pub struct LocationSegmenter {
    config: SegmentationConfig,
    geofences: GeofenceIndex,
}

impl LocationSegmenter {
    /// Validate the configuration and build the geofence index.
    pub fn new(config: SegmentationConfig) -> Result<Self> {
        config.validate()?;
        let geofences = GeofenceIndex::new(&config.geofences);
        Ok(Self { config, geofences })
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Run the full pipeline and return the final segments.
    pub fn segment(&self, samples: &[Sample]) -> SegmentationResult {
        if samples.is_empty() {
            return SegmentationResult::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by_key(|s| s.timestamp);

        let mut stats = SegmentationStats {
            samples: sorted.len(),
            ..SegmentationStats::default()
        };
        let mut raw = Vec::new();
        let mut active_periods = BTreeMap::new();

        for (date, day_samples) in group_by_day(&sorted) {
            let day = build_day(date, &day_samples, &self.geofences, &self.config);
            stats.days += 1;
            stats.raw_segments += day.segments.len();
            stats.dropped_segments += day.dropped;
            raw.extend(day.segments);
            active_periods.insert(date, day.active_periods);
        }

        let merged = merge_segments(raw);
        stats.merged_segments = merged.len();

        let segments = refine_segments(merged, &active_periods);
        stats.gap_segments = segments
            .iter()
            .filter(|s| s.label == SegmentLabel::Invalid)
            .count();

        info!(
            "[Segments] {} samples, {} days: {} raw ({} dropped), {} merged, {} final ({} gaps)",
            stats.samples,
            stats.days,
            stats.raw_segments,
            stats.dropped_segments,
            stats.merged_segments,
            segments.len(),
            stats.gap_segments
        );

        SegmentationResult {
            segments,
            active_periods,
            stats,
        }
    }

    /// Segment the samples carried by `sensor_events` and emit Enter/Exit
    /// events plus one `location_segment` object per final segment.
    ///
    /// Returns the updated graph and the newly created events. Empty input
    /// leaves the graph untouched.
    pub fn segment_into_graph<D, I>(
        &self,
        mut graph: OcedGraph,
        sensor_events: &[SensorEvent],
        user_id: &str,
        days: &mut D,
        ids: &mut I,
    ) -> (OcedGraph, Vec<BehaviorEvent>)
    where
        D: DayObjectFactory + ?Sized,
        I: IdGenerator + ?Sized,
    {
        let samples: Vec<Sample> = sensor_events
            .iter()
            .filter_map(Sample::from_sensor_event)
            .collect();
        if samples.is_empty() {
            return (graph, Vec::new());
        }

        let result = self.segment(&samples);
        let summary = emit_segments(&mut graph, &result.segments, user_id, days, ids);
        (graph, summary.events)
    }

    /// Segment several users independently and in parallel.
    #[cfg(feature = "parallel")]
    pub fn segment_users_parallel(
        &self,
        users: &[(String, Vec<Sample>)],
    ) -> Vec<(String, SegmentationResult)> {
        users
            .par_iter()
            .map(|(user_id, samples)| (user_id.clone(), self.segment(samples)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Geofence;
    use chrono::{DateTime, Duration, FixedOffset};

    fn ts(minute: i64) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-01T08:00:00+00:00").unwrap()
            + Duration::minutes(minute)
    }

    fn segmenter() -> LocationSegmenter {
        LocationSegmenter::new(SegmentationConfig {
            geofences: vec![Geofence::new("home", 52.0, 4.0, 100.0)],
            ..SegmentationConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_empty_input() {
        let result = segmenter().segment(&[]);
        assert!(result.segments.is_empty());
        assert_eq!(result.stats, SegmentationStats::default());
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let mut samples: Vec<Sample> = (0..=10)
            .map(|m| Sample::new(format!("s{m}"), ts(m), 52.0, 4.0))
            .collect();
        samples.reverse();
        let result = segmenter().segment(&samples);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].start, ts(0));
        assert_eq!(result.segments[0].end, ts(10));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SegmentationConfig {
            geofences: vec![Geofence::new("home", 52.0, 4.0, 0.0)],
            ..SegmentationConfig::default()
        };
        assert!(LocationSegmenter::new(config).is_err());
    }

    #[test]
    fn test_segments_on_date() {
        let samples: Vec<Sample> = (0..=10)
            .map(|m| Sample::new(format!("s{m}"), ts(m), 52.0, 4.0))
            .collect();
        let result = segmenter().segment(&samples);
        assert_eq!(result.segments_on(ts(0).date_naive()).count(), 1);
        assert_eq!(result.segments_on(ts(0).date_naive().succ_opt().unwrap()).count(), 0);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_users_match_sequential() {
        let segmenter = LocationSegmenter::new(SegmentationConfig {
            geofences: vec![
                Geofence::new("home", 52.0, 4.0, 100.0),
                Geofence::new("work", 52.1, 4.1, 100.0),
            ],
            ..SegmentationConfig::default()
        })
        .unwrap();

        let commuter: Vec<Sample> = (0..=20)
            .map(|m| Sample::new(format!("c{m}"), ts(m), 52.0, 4.0))
            .chain((25..=60).map(|m| Sample::new(format!("c{m}"), ts(m), 52.1, 4.1)))
            .collect();
        let homebody: Vec<Sample> = (0..=40)
            .map(|m| match m {
                5..=15 => Sample::no_fix(format!("h{m}"), ts(m)),
                _ => Sample::new(format!("h{m}"), ts(m), 52.0, 4.0),
            })
            .collect();
        let users = vec![
            ("commuter".to_string(), commuter),
            ("homebody".to_string(), homebody),
            ("idle".to_string(), Vec::new()),
        ];

        let results = segmenter.segment_users_parallel(&users);

        assert_eq!(results.len(), users.len());
        for ((user_id, samples), (result_id, result)) in users.iter().zip(&results) {
            assert_eq!(user_id, result_id);
            assert_eq!(result, &segmenter.segment(samples));
        }
        assert_eq!(results[0].1.segments.len(), 2);
    }
}
