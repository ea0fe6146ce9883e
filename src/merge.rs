//! Day-scoped merging of consecutive same-labeled segments.
//!
//! Within a day, a run of consecutive segments sharing a label collapses into
//! one segment even when a dropped short segment sat between them. Segments
//! never merge across calendar days.

use crate::Segment;

/// Merge runs of consecutive same-labeled segments of the same day.
///
/// The input is sorted by start time (stably) before scanning; each merged
/// segment ends where the last member of its run ends.
pub fn merge_segments(mut segments: Vec<Segment>) -> Vec<Segment> {
    segments.sort_by_key(|s| s.start);

    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(current) if current.label == segment.label && current.date() == segment.date() => {
                current.end = segment.end;
                current.end_sample = segment.end_sample;
            }
            _ => merged.push(segment),
        }
    }
    merged
}
