//! Gap filling over a day's active periods.
//!
//! Sweeps every active period from start to end against the day's merged
//! segments. Covered spans keep their segment's label; uncovered spans
//! (before the first segment, between two segments, after the last one)
//! become `invalid` gap segments. Segments reaching outside an active period
//! are clipped to it, so the output tiles the active periods exactly: no
//! holes, no overlaps, nothing outside them.
//!
//! Active periods of zero length (a lone sample) have no extent and yield
//! nothing.

use chrono::{DateTime, FixedOffset};
use log::debug;

use crate::{ActivePeriod, Segment, SegmentLabel};

/// Tile the active periods of one day with that day's merged segments and
/// synthesized gap segments.
pub fn fill_gaps(segments: &[Segment], periods: &[ActivePeriod]) -> Vec<Segment> {
    let mut ordered: Vec<&Segment> = segments.iter().collect();
    ordered.sort_by_key(|s| s.start);

    let mut tiles = Vec::with_capacity(segments.len() + periods.len());
    let mut gap_count = 0usize;

    for period in periods.iter().filter(|p| p.end > p.start) {
        let mut cursor = period.start;
        let mut cursor_sample = period.first_sample.as_str();

        for segment in ordered
            .iter()
            .filter(|s| s.start < period.end && s.end > period.start)
        {
            let start = segment.start.max(cursor);
            let end = segment.end.min(period.end);
            if end <= start {
                continue;
            }

            let start_sample = if start == segment.start {
                segment.start_sample.as_str()
            } else {
                cursor_sample
            };
            let end_sample = if end == segment.end {
                segment.end_sample.as_str()
            } else {
                period.last_sample.as_str()
            };

            if start > cursor {
                tiles.push(gap(cursor, start, cursor_sample, start_sample));
                gap_count += 1;
            }

            tiles.push(Segment {
                label: segment.label.clone(),
                start,
                end,
                start_sample: start_sample.to_string(),
                end_sample: end_sample.to_string(),
            });

            cursor = end;
            cursor_sample = end_sample;
        }

        if cursor < period.end {
            tiles.push(gap(cursor, period.end, cursor_sample, &period.last_sample));
            gap_count += 1;
        }
    }

    if gap_count > 0 {
        debug!(
            "[Gaps] Filled {} gaps across {} active periods",
            gap_count,
            periods.len()
        );
    }

    tiles
}

fn gap(
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    start_sample: &str,
    end_sample: &str,
) -> Segment {
    Segment {
        label: SegmentLabel::Invalid,
        start,
        end,
        start_sample: start_sample.to_string(),
        end_sample: end_sample.to_string(),
    }
}
