//! Relationship enrichment against emitted location segments.
//!
//! These passes relate other events and objects (activity bouts, mood
//! reports, notifications) to the `location_segment` objects of a graph.
//! They only add relationship edges or attributes to the records being
//! related; segments are never modified.

use chrono::{DateTime, FixedOffset};
use log::{info, warn};

use crate::oced::{
    AttributeDefinition, OcedGraph, Qualifier, Relationship, WireAttribute, LOCATION_SEGMENT_TYPE,
};

/// Segment bounds in start order.
fn segment_bounds(
    graph: &OcedGraph,
) -> Vec<(String, DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    let mut bounds: Vec<_> = graph
        .objects()
        .iter()
        .filter(|o| o.object_type() == LOCATION_SEGMENT_TYPE)
        .filter_map(|o| match o.interval() {
            Some((start, end)) => Some((o.id().to_string(), start, end)),
            None => {
                warn!("[Enrich] Location segment {} has no start or end time", o.id());
                None
            }
        })
        .collect();
    bounds.sort_by_key(|(_, start, _)| *start);
    bounds
}

/// Relate each behavior event of `event_type` to the segment containing its
/// timestamp (`occurred_in_location`). Bounds are inclusive; when segments
/// share a boundary the earlier one wins.
///
/// Returns the number of edges added.
pub fn relate_events_to_locations(graph: &mut OcedGraph, event_type: &str) -> usize {
    let segments = segment_bounds(graph);

    let mut links = Vec::new();
    for event in graph.behavior_events().iter().filter(|e| e.event_type() == event_type) {
        let Some(time) = event.time() else {
            warn!("[Enrich] Event {} has an unreadable time, skipping", event.id());
            continue;
        };
        if let Some((segment_id, _, _)) = segments
            .iter()
            .find(|(_, start, end)| *start <= time && time <= *end)
        {
            links.push((event.id().to_string(), segment_id.clone()));
        }
    }

    let added = links
        .into_iter()
        .filter(|(event_id, segment_id)| {
            graph.add_event_relationship(
                event_id,
                Relationship::object(segment_id.as_str(), Qualifier::OccurredInLocation),
            )
        })
        .count();

    info!("[Enrich] Related {} {} events to locations", added, event_type);
    added
}

/// Relate objects of `object_type` to the segments their `event_type`
/// events occurred in (`overlaps_with_location`).
///
/// An event belongs to an object when it points at it with a `starts` or
/// `ends` qualifier. Run [`relate_events_to_locations`] for `event_type`
/// first.
pub fn relate_objects_to_locations(
    graph: &mut OcedGraph,
    object_type: &str,
    event_type: &str,
) -> usize {
    let mut links = Vec::new();
    for event in graph.behavior_events().iter().filter(|e| e.event_type() == event_type) {
        let locations: Vec<&str> = event
            .relationships()
            .iter()
            .filter(|r| r.qualifier == Qualifier::OccurredInLocation)
            .map(|r| r.id.as_str())
            .collect();
        if locations.is_empty() {
            continue;
        }

        for owner in event
            .relationships()
            .iter()
            .filter(|r| matches!(r.qualifier, Qualifier::Starts | Qualifier::Ends))
            .filter(|r| graph.object(&r.id).is_some_and(|o| o.object_type() == object_type))
        {
            for location in &locations {
                links.push((owner.id.clone(), (*location).to_string()));
            }
        }
    }

    let added = links
        .into_iter()
        .filter(|(object_id, segment_id)| {
            graph.add_object_relationship(
                object_id,
                Relationship::object(segment_id.as_str(), Qualifier::OverlapsWithLocation),
            )
        })
        .count();

    info!("[Enrich] Related {} {} objects to locations", added, object_type);
    added
}

/// Relate objects of `object_type` carrying `start_time`/`end_time`
/// attributes to every segment their interval overlaps
/// (`overlaps_with_location`).
pub fn relate_intervals_to_locations(graph: &mut OcedGraph, object_type: &str) -> usize {
    if object_type == LOCATION_SEGMENT_TYPE {
        return 0;
    }
    let segments = segment_bounds(graph);

    let mut links = Vec::new();
    for object in graph.objects().iter().filter(|o| o.object_type() == object_type) {
        let Some((start, end)) = object.interval() else {
            warn!("[Enrich] Object {} has no start or end time, skipping", object.id());
            continue;
        };
        for (segment_id, seg_start, seg_end) in &segments {
            if *seg_start <= end && start <= *seg_end {
                links.push((object.id().to_string(), segment_id.clone()));
            }
        }
    }

    let added = links
        .into_iter()
        .filter(|(object_id, segment_id)| {
            graph.add_object_relationship(
                object_id,
                Relationship::object(segment_id.as_str(), Qualifier::OverlapsWithLocation),
            )
        })
        .count();

    info!("[Enrich] Related {} {} intervals to locations", added, object_type);
    added
}

/// Copy the `location_type` of each event's `occurred_in_location` segment
/// into a `location` attribute, and declare that attribute on the event type.
///
/// Returns the number of events updated. Does nothing if `event_type` is not
/// registered in the graph.
pub fn add_location_attribute(graph: &mut OcedGraph, event_type: &str) -> usize {
    let Some(definition) = graph.behavior_event_type_mut(event_type) else {
        warn!("[Enrich] Behavior event type {} not found", event_type);
        return 0;
    };
    if !definition.has_attribute("location") {
        definition.attributes.push(AttributeDefinition {
            name: "location".to_string(),
            kind: "string".to_string(),
        });
    }

    let mut updates = Vec::new();
    for event in graph.behavior_events().iter().filter(|e| e.event_type() == event_type) {
        let location = event
            .relationships()
            .iter()
            .filter(|r| r.qualifier == Qualifier::OccurredInLocation)
            .find_map(|r| graph.object(&r.id).and_then(|o| o.as_location_segment()));
        if let Some(segment) = location {
            updates.push((event.id().to_string(), segment.location_type.to_string()));
        }
    }

    let updated = updates
        .into_iter()
        .filter(|(event_id, location)| {
            graph.set_event_attribute(event_id, WireAttribute::new("location", location.as_str()))
        })
        .count();

    info!("[Enrich] Added location to {} {} events", updated, event_type);
    updated
}
