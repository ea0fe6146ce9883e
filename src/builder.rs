//! Per-day segment builder.
//!
//! Scans one calendar day of time-sorted samples, classifies each sample,
//! closes a raw segment on every state change and drops segments shorter
//! than the minimum duration. Alongside, it tracks the day's active periods
//! (spans where samples kept arriving), which only bound gap filling.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use log::debug;

use crate::classifier::{classify, Fix, GeofenceIndex, LocationState, Observation, Thresholds};
use crate::config::SegmentationConfig;
use crate::{ActivePeriod, Sample, Segment, SegmentLabel};

/// Raw segments and active periods of one day.
#[derive(Debug, Clone, Default)]
pub struct DaySegments {
    pub date: Option<NaiveDate>,
    /// Segments that survived the minimum-duration filter, in time order
    pub segments: Vec<Segment>,
    pub active_periods: Vec<ActivePeriod>,
    /// Number of segments discarded as too short
    pub dropped: usize,
}

/// Group time-sorted samples by the calendar date of their timestamp.
///
/// Sample order within each day is preserved.
pub fn group_by_day(samples: &[Sample]) -> BTreeMap<NaiveDate, Vec<&Sample>> {
    let mut days: BTreeMap<NaiveDate, Vec<&Sample>> = BTreeMap::new();
    for sample in samples {
        days.entry(sample.date()).or_default().push(sample);
    }
    days
}

/// Segment currently being extended.
struct OpenSegment {
    state: LocationState,
    start: DateTime<FixedOffset>,
    start_sample: String,
}

/// Build the raw segments and active periods of one day.
///
/// `samples` must belong to `date` and be sorted by timestamp.
pub fn build_day(
    date: NaiveDate,
    samples: &[&Sample],
    geofences: &GeofenceIndex,
    config: &SegmentationConfig,
) -> DaySegments {
    let thresholds = Thresholds::from_config(config);
    let min_duration = config.min_segment_duration();
    let active_gap = config.active_period_gap();

    let mut day = DaySegments {
        date: Some(date),
        ..DaySegments::default()
    };

    let mut open: Option<OpenSegment> = None;
    let mut prev_fix: Option<Fix> = None;

    for sample in samples {
        extend_active_periods(&mut day.active_periods, sample, active_gap);

        let is_invalid = !sample.has_fix();
        let state = if is_invalid && prev_fix.is_none() {
            // No fix yet today: assume the day starts at home
            LocationState::Geofence(config.default_home_geofence.clone())
        } else {
            let invalid_run = match (&prev_fix, is_invalid) {
                (Some(fix), true) => sample.timestamp - fix.time,
                _ => Duration::zero(),
            };
            let obs = Observation {
                point: sample.point,
                time: sample.timestamp,
                is_invalid,
                invalid_run,
                prev_fix: prev_fix.as_ref(),
                prev_state: open.as_ref().map(|o| &o.state),
            };
            classify(&obs, geofences, &thresholds)
        };

        let changed = open.as_ref().map_or(true, |o| o.state != state);
        if changed {
            if let Some(finished) = open.take() {
                close_segment(&mut day, finished, sample, min_duration);
            }
            open = Some(OpenSegment {
                state,
                start: sample.timestamp,
                start_sample: sample.id.clone(),
            });
        }

        if !is_invalid {
            prev_fix = Some(Fix {
                point: sample.point,
                time: sample.timestamp,
            });
        }
    }

    if let (Some(finished), Some(last)) = (open, samples.last()) {
        close_segment(&mut day, finished, last, min_duration);
    }

    debug!(
        "[Segments] {}: {} samples -> {} segments ({} dropped), {} active periods",
        date,
        samples.len(),
        day.segments.len(),
        day.dropped,
        day.active_periods.len()
    );

    day
}

fn extend_active_periods(periods: &mut Vec<ActivePeriod>, sample: &Sample, max_gap: Duration) {
    match periods.last_mut() {
        Some(period) if sample.timestamp - period.end <= max_gap => {
            period.end = sample.timestamp;
            period.last_sample = sample.id.clone();
        }
        _ => periods.push(ActivePeriod {
            start: sample.timestamp,
            end: sample.timestamp,
            first_sample: sample.id.clone(),
            last_sample: sample.id.clone(),
        }),
    }
}

fn close_segment(day: &mut DaySegments, open: OpenSegment, end: &Sample, min_duration: Duration) {
    let duration = end.timestamp - open.start;
    if duration < min_duration {
        day.dropped += 1;
        return;
    }
    day.segments.push(Segment {
        label: SegmentLabel::from(open.state),
        start: open.start,
        end: end.timestamp,
        start_sample: open.start_sample,
        end_sample: end.id.clone(),
    });
}
