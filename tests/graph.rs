//! Tests for emitting segments into an OCED graph and reading them back

use chrono::{DateTime, Duration, FixedOffset};
use location_segments::{
    samples_from_sensor_events, Geofence, GraphDayFactory, LocationSegmenter, OcedGraph, Qualifier,
    SegmentLabel, SegmentationConfig, SensorEvent, SequentialIds,
};
use serde_json::json;

fn ts(minute: i64) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2024-03-01T08:00:00+00:00").unwrap()
        + Duration::minutes(minute)
}

fn segmenter() -> LocationSegmenter {
    LocationSegmenter::new(SegmentationConfig {
        geofences: vec![
            Geofence::new("home", 52.00, 4.00, 100.0),
            Geofence::new("work", 52.10, 4.10, 100.0),
        ],
        ..SegmentationConfig::default()
    })
    .unwrap()
}

fn sensor_events() -> Vec<SensorEvent> {
    let mut events: Vec<SensorEvent> = (0..=20)
        .map(|m| SensorEvent::location(format!("s{m}"), &ts(m), 52.00, 4.00))
        .collect();
    events.extend(
        (24..=60).map(|m| SensorEvent::location(format!("s{m}"), &ts(m), 52.10, 4.10)),
    );
    // next morning
    events.extend((0..=30).map(|m| {
        SensorEvent::location(format!("n{m}"), &(ts(m) + Duration::days(1)), 52.00, 4.00)
    }));
    events
}

fn base_graph() -> OcedGraph {
    OcedGraph::from_json_str(
        &json!({
            "objects": [{"id": "user-1", "type": "user", "attributes": [], "relationships": []}],
            "objectTypes": [{"name": "user", "attributes": []}]
        })
        .to_string(),
    )
    .unwrap()
}

#[test]
fn test_segment_into_graph() {
    let segmenter = segmenter();
    let events = sensor_events();
    let mut days = GraphDayFactory::new(SequentialIds::new("day"));
    let mut ids = SequentialIds::new("loc");

    let (graph, new_events) =
        segmenter.segment_into_graph(base_graph(), &events, "user-1", &mut days, &mut ids);

    let segments: Vec<_> = graph.location_segments().collect();
    assert_eq!(
        segments.iter().map(|s| s.location_type.as_str()).collect::<Vec<_>>(),
        vec!["home", "work", "home"]
    );
    assert_eq!(new_events.len(), 2 * segments.len());
    // one day object per date, shared by all segments of that date
    assert_eq!(graph.day_objects().count(), 2);
    assert!(graph.has_relationship(&segments[0].id, &Qualifier::OccurredOn, "day-1"));
    assert!(graph.has_relationship(&segments[1].id, &Qualifier::OccurredOn, "day-1"));
    assert!(graph.has_relationship(&segments[2].id, &Qualifier::OccurredOn, "day-2"));
    assert!(graph.has_relationship(&segments[0].id, &Qualifier::PerformedBy, "user-1"));
    assert_eq!(graph.object("user-1").unwrap().object_type(), "user");
}

#[test]
fn test_wire_round_trip() {
    let segmenter = segmenter();
    let events = sensor_events();
    let mut days = GraphDayFactory::new(SequentialIds::new("day"));
    let mut ids = SequentialIds::new("loc");
    let result = segmenter.segment(&samples_from_sensor_events(&events));

    let (graph, _) =
        segmenter.segment_into_graph(base_graph(), &events, "user-1", &mut days, &mut ids);

    let text = graph.to_json_string().unwrap();
    let reparsed = OcedGraph::from_json_str(&text).unwrap();

    let segments: Vec<_> = reparsed.location_segments().collect();
    assert_eq!(segments.len(), result.segments.len());
    for (object, segment) in segments.iter().zip(&result.segments) {
        assert_eq!(object.start, segment.start);
        assert_eq!(object.end, segment.end);
        assert_eq!(object.location_type, segment.label);
    }
    assert_eq!(reparsed.behavior_events(), graph.behavior_events());
    assert_eq!(reparsed.relationship_count(), graph.relationship_count());
}

#[test]
fn test_sensor_events_from_wire_json() {
    let graph = OcedGraph::from_json_str(
        &json!({
            "sensorEvents": [
                {
                    "id": "a", "sensorEventType": "location", "time": "2024-03-01T08:00:00Z",
                    "sensorEventTypeAttributes": [
                        {"name": "latitude", "value": 52.0}, {"name": "longitude", "value": 4.0}
                    ]
                },
                {
                    "id": "b", "sensorEventType": "accelerometer", "time": "2024-03-01T08:00:00Z",
                    "sensorEventTypeAttributes": [{"name": "x", "value": 0.1}]
                }
            ]
        })
        .to_string(),
    )
    .unwrap();

    let locations: Vec<_> = graph.location_sensor_events().collect();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].id, "a");
    assert_eq!(locations[0].numeric_attribute("latitude"), Some(52.0));
    assert_eq!(graph.sensor_events_of_type(None).count(), 2);
}

#[test]
fn test_other_sensors_do_not_extend_location_data() {
    let mut graph = OcedGraph::new();
    for m in 0..=10 {
        graph.add_sensor_event(SensorEvent::location(format!("s{m}"), &ts(m), 52.00, 4.00));
    }
    for m in 11..=60 {
        let reading: SensorEvent = serde_json::from_value(json!({
            "id": format!("acc{m}"), "sensorEventType": "accelerometer", "time": ts(m).to_rfc3339(),
            "sensorEventTypeAttributes": [{"name": "x", "value": 0.1}]
        }))
        .unwrap();
        graph.add_sensor_event(reading);
    }

    let samples = samples_from_sensor_events(graph.location_sensor_events());
    let result = segmenter().segment(&samples);
    assert_eq!(result.segments.len(), 1);
    assert_eq!(result.segments[0].label.as_str(), "home");
    assert_eq!(result.segments[0].end, ts(10));

    // every sensor event as a sample turns the accelerometer tail into lost GPS
    let samples = samples_from_sensor_events(graph.sensor_events());
    let result = segmenter().segment(&samples);
    assert!(result.segments.iter().any(|s| s.label == SegmentLabel::InvalidGps));
}

#[test]
fn test_empty_input_leaves_graph_unchanged() {
    let before = base_graph();
    let mut days = GraphDayFactory::new(SequentialIds::new("day"));
    let mut ids = SequentialIds::new("loc");

    let (after, new_events) =
        segmenter().segment_into_graph(before.clone(), &[], "user-1", &mut days, &mut ids);

    assert!(new_events.is_empty());
    assert_eq!(
        serde_json::to_value(&after).unwrap(),
        serde_json::to_value(&before).unwrap()
    );
}

#[test]
fn test_graph_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.json");

    let mut days = GraphDayFactory::new(SequentialIds::new("day"));
    let mut ids = SequentialIds::new("loc");
    let events = sensor_events();
    let (graph, _) =
        segmenter().segment_into_graph(base_graph(), &events, "user-1", &mut days, &mut ids);
    graph.write_json_file(&path).unwrap();

    let loaded = OcedGraph::from_json_file(&path).unwrap();
    assert_eq!(loaded.location_segments().count(), graph.location_segments().count());
    assert_eq!(loaded.day_objects().count(), 2);
    assert!(loaded.behavior_event_type("location_event").is_some());
}
