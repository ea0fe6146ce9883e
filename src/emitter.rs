//! Emission of final segments into the OCED graph.
//!
//! Each segment becomes an `Entering`/`Exiting` location event pair and one
//! `location_segment` object linking both. All three records point at the
//! user (`performed_by`) and the day the segment starts on (`occurred_on`).
//! The day and all three ids are resolved before anything is written, so a
//! segment whose day cannot be resolved, or whose ids are already taken,
//! leaves no location records in the graph.

use log::{debug, info, warn};

use crate::days::DayObjectFactory;
use crate::ids::IdGenerator;
use crate::oced::{
    BehaviorEvent, Lifecycle, LocationEvent, LocationSegmentObject, OcedGraph, Qualifier,
    Relationship, TypeDefinition,
};
use crate::Segment;

/// Outcome of one emission pass.
#[derive(Debug, Clone, Default)]
pub struct EmitSummary {
    /// Newly created location events, in emission order
    pub events: Vec<BehaviorEvent>,
    /// Ids of the created `location_segment` objects
    pub segment_ids: Vec<String>,
    /// Segments abandoned because their day could not be resolved or their
    /// ids collided with existing records
    pub skipped: usize,
}

/// Write `segments` into `graph` as location events and segment objects.
pub fn emit_segments<D, I>(
    graph: &mut OcedGraph,
    segments: &[Segment],
    user_id: &str,
    days: &mut D,
    ids: &mut I,
) -> EmitSummary
where
    D: DayObjectFactory + ?Sized,
    I: IdGenerator + ?Sized,
{
    let mut summary = EmitSummary::default();

    for segment in segments {
        let day_id = match days.get_or_create_day(graph, segment.date()) {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    "[Emitter] Skipping {} segment at {}: {}",
                    segment.label, segment.start, e
                );
                summary.skipped += 1;
                continue;
            }
        };

        let enter_id = ids.next_id();
        let exit_id = ids.next_id();
        let object_id = ids.next_id();
        let taken = enter_id == exit_id
            || graph.behavior_event(&enter_id).is_some()
            || graph.behavior_event(&exit_id).is_some()
            || graph.object(&object_id).is_some();
        if taken {
            warn!(
                "[Emitter] Skipping {} segment at {}: ids {}, {}, {} collide with existing records",
                segment.label, segment.start, enter_id, exit_id, object_id
            );
            summary.skipped += 1;
            continue;
        }

        if summary.segment_ids.is_empty() {
            graph.ensure_behavior_event_type(TypeDefinition::location_event());
            graph.ensure_object_type(TypeDefinition::location_segment());
        }

        let context = |sample: &str| {
            vec![
                Relationship::object(sample, Qualifier::DerivedFrom),
                Relationship::object(user_id, Qualifier::PerformedBy),
                Relationship::object(day_id.as_str(), Qualifier::OccurredOn),
            ]
        };

        let enter = LocationEvent {
            id: enter_id,
            time: segment.start,
            lifecycle: Lifecycle::Entering,
            location_type: segment.label.clone(),
            relationships: context(&segment.start_sample),
        };
        let exit = LocationEvent {
            id: exit_id,
            time: segment.end,
            lifecycle: Lifecycle::Exiting,
            location_type: segment.label.clone(),
            relationships: context(&segment.end_sample),
        };
        let object = LocationSegmentObject {
            id: object_id,
            location_type: segment.label.clone(),
            start: segment.start,
            end: segment.end,
            relationships: vec![
                Relationship::behavior_event(enter.id.as_str(), Qualifier::Enters),
                Relationship::behavior_event(exit.id.as_str(), Qualifier::Exits),
                Relationship::object(user_id, Qualifier::PerformedBy),
                Relationship::object(day_id.as_str(), Qualifier::OccurredOn),
            ],
        };

        debug!(
            "[Emitter] {} {} -> {} as {}",
            segment.label, segment.start, segment.end, object.id
        );

        summary.segment_ids.push(object.id.clone());
        for event in [enter, exit] {
            let event = BehaviorEvent::Location(event);
            graph.add_behavior_event(event.clone());
            summary.events.push(event);
        }
        graph.add_object(object);
    }

    info!(
        "[Emitter] Emitted {} segments ({} events) for user {}, skipped {}",
        summary.segment_ids.len(),
        summary.events.len(),
        user_id,
        summary.skipped
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SegmentationError};
    use crate::ids::SequentialIds;
    use crate::{GraphDayFactory, SegmentLabel};
    use chrono::{DateTime, Duration, FixedOffset, NaiveDate};

    fn ts(day: u32, minute: i64) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(&format!("2024-03-{:02}T08:00:00+00:00", day)).unwrap()
            + Duration::minutes(minute)
    }

    fn seg(label: &str, day: u32, start: i64, end: i64) -> Segment {
        Segment {
            label: SegmentLabel::parse(label),
            start: ts(day, start),
            end: ts(day, end),
            start_sample: format!("s{day}-{start}"),
            end_sample: format!("s{day}-{end}"),
        }
    }

    /// Refuses one date.
    struct FailingOn(NaiveDate, GraphDayFactory<SequentialIds>);

    impl DayObjectFactory for FailingOn {
        fn get_or_create_day(&mut self, graph: &mut OcedGraph, date: NaiveDate) -> Result<String> {
            if date == self.0 {
                return Err(SegmentationError::DayObject {
                    date,
                    message: "store unavailable".to_string(),
                });
            }
            self.1.get_or_create_day(graph, date)
        }
    }

    #[test]
    fn test_emits_event_pair_and_object() {
        let mut graph = OcedGraph::new();
        let mut days = GraphDayFactory::new(SequentialIds::new("day"));
        let mut ids = SequentialIds::new("loc");

        let summary =
            emit_segments(&mut graph, &[seg("home", 1, 0, 30)], "user-1", &mut days, &mut ids);

        assert_eq!(summary.events.len(), 2);
        assert_eq!(summary.segment_ids, vec!["loc-3".to_string()]);

        let enter = summary.events[0].as_location().unwrap();
        assert_eq!(enter.lifecycle, Lifecycle::Entering);
        assert_eq!(enter.time, ts(1, 0));
        assert!(graph.has_relationship(&enter.id, &Qualifier::DerivedFrom, "s1-0"));
        assert!(graph.has_relationship(&enter.id, &Qualifier::PerformedBy, "user-1"));
        assert!(graph.has_relationship(&enter.id, &Qualifier::OccurredOn, "day-1"));

        let exit = summary.events[1].as_location().unwrap();
        assert_eq!(exit.lifecycle, Lifecycle::Exiting);
        assert!(graph.has_relationship(&exit.id, &Qualifier::DerivedFrom, "s1-30"));

        let object = graph.location_segments().next().unwrap();
        assert_eq!(object.location_type.as_str(), "home");
        assert!(graph.has_relationship(&object.id, &Qualifier::Enters, &enter.id));
        assert!(graph.has_relationship(&object.id, &Qualifier::Exits, &exit.id));
        assert!(graph.has_relationship(&object.id, &Qualifier::OccurredOn, "day-1"));

        assert!(graph.behavior_event_type("location_event").is_some());
        assert_eq!(graph.object_types().len(), 2);
    }

    #[test]
    fn test_unresolved_day_skips_segment() {
        let mut graph = OcedGraph::new();
        let mut days = FailingOn(
            ts(2, 0).date_naive(),
            GraphDayFactory::new(SequentialIds::new("day")),
        );
        let mut ids = SequentialIds::new("loc");

        let summary = emit_segments(
            &mut graph,
            &[seg("home", 1, 0, 30), seg("work", 2, 0, 30), seg("home", 3, 0, 30)],
            "user-1",
            &mut days,
            &mut ids,
        );

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.segment_ids.len(), 2);
        assert_eq!(graph.behavior_events().len(), 4);
        assert_eq!(graph.location_segments().count(), 2);
        assert!(graph
            .location_segments()
            .all(|s| s.location_type.as_str() == "home"));
    }

    #[test]
    fn test_no_segments_leaves_graph_untouched() {
        let mut graph = OcedGraph::new();
        let mut days = GraphDayFactory::new(SequentialIds::new("day"));
        let mut ids = SequentialIds::default();
        let summary = emit_segments(&mut graph, &[], "user-1", &mut days, &mut ids);
        assert!(summary.events.is_empty());
        assert!(graph.objects().is_empty());
        assert!(graph.behavior_event_types().is_empty());
    }

    #[test]
    fn test_taken_ids_skip_segment_without_partial_writes() {
        let mut graph = OcedGraph::from_json_str(
            r#"{"behaviorEvents": [{
                "id": "loc-1", "behaviorEventType": "mood_report",
                "time": "2024-03-01T09:00:00+00:00", "relationships": []
            }]}"#,
        )
        .unwrap();
        let mut days = GraphDayFactory::new(SequentialIds::new("day"));
        let mut ids = SequentialIds::new("loc");

        let summary = emit_segments(
            &mut graph,
            &[seg("home", 1, 0, 30), seg("work", 1, 30, 60)],
            "user-1",
            &mut days,
            &mut ids,
        );

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.segment_ids, vec!["loc-6".to_string()]);
        assert_eq!(summary.events.len(), 2);
        assert_eq!(graph.behavior_events().len(), 3);
        assert_eq!(graph.behavior_event("loc-1").unwrap().event_type(), "mood_report");

        let segments: Vec<_> = graph.location_segments().collect();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].location_type.as_str(), "work");
        assert!(graph.has_relationship("loc-6", &Qualifier::Enters, "loc-4"));
        assert!(graph.has_relationship("loc-6", &Qualifier::Exits, "loc-5"));
    }
}
