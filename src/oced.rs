//! # OCED Graph
//!
//! Object-centric event data: sensor events, behavior events and objects
//! connected by qualified relationship edges, plus the type definitions that
//! describe them.
//!
//! Records this crate produces or reads (location events, location segments,
//! days) are typed; everything else is carried as a raw record so that a
//! graph can be loaded, extended and written back without losing data. The
//! loosely typed `{name, value, time}` attribute lists only exist at the
//! serialization boundary.
//!
//! Relationship existence checks go through an index of
//! `(subject, qualifier, target)` edges that is built once on load and kept
//! current on every insertion.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SegmentationError};
use crate::{GpsPoint, Sample, SegmentLabel};

/// Behavior event type emitted for segment boundaries.
pub const LOCATION_EVENT_TYPE: &str = "location_event";
/// Object type emitted per final segment.
pub const LOCATION_SEGMENT_TYPE: &str = "location_segment";
/// Object type of calendar days.
pub const DAY_TYPE: &str = "day";
/// `sensorEventType` of GPS readings.
pub const LOCATION_SENSOR_TYPE: &str = "location";

/// Display format of `start_time`/`end_time` attribute values.
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a wire timestamp.
///
/// Accepts RFC 3339 (`Z` or numeric offset) and naive ISO-8601 date-times,
/// which are taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc().fixed_offset());
        }
    }
    Err(SegmentationError::InvalidTimestamp {
        value: value.to_string(),
    })
}

fn display_time(ts: &DateTime<FixedOffset>) -> String {
    ts.format(DISPLAY_FORMAT).to_string()
}

// ============================================================================
// Wire building blocks
// ============================================================================

/// One `{name, value, time?}` attribute entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireAttribute {
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl WireAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            time: None,
        }
    }

    pub fn at(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

fn find_attribute<'a>(attributes: &'a [WireAttribute], name: &str) -> Option<&'a WireAttribute> {
    attributes.iter().find(|a| a.name == name)
}

fn upsert_attribute(attributes: &mut Vec<WireAttribute>, attribute: WireAttribute) {
    match attributes.iter_mut().find(|a| a.name == attribute.name) {
        Some(existing) => *existing = attribute,
        None => attributes.push(attribute),
    }
}

/// Relationship qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Qualifier {
    DerivedFrom,
    PerformedBy,
    OccurredOn,
    Enters,
    Exits,
    Starts,
    Ends,
    OccurredInLocation,
    OverlapsWithLocation,
    Other(String),
}

impl Qualifier {
    pub fn as_str(&self) -> &str {
        match self {
            Qualifier::DerivedFrom => "derived_from",
            Qualifier::PerformedBy => "performed_by",
            Qualifier::OccurredOn => "occurred_on",
            Qualifier::Enters => "enters",
            Qualifier::Exits => "exits",
            Qualifier::Starts => "starts",
            Qualifier::Ends => "ends",
            Qualifier::OccurredInLocation => "occurred_in_location",
            Qualifier::OverlapsWithLocation => "overlaps_with_location",
            Qualifier::Other(q) => q,
        }
    }
}

impl From<String> for Qualifier {
    fn from(value: String) -> Self {
        match value.as_str() {
            "derived_from" => Qualifier::DerivedFrom,
            "performed_by" => Qualifier::PerformedBy,
            "occurred_on" => Qualifier::OccurredOn,
            "enters" => Qualifier::Enters,
            "exits" => Qualifier::Exits,
            "starts" => Qualifier::Starts,
            "ends" => Qualifier::Ends,
            "occurred_in_location" => Qualifier::OccurredInLocation,
            "overlaps_with_location" => Qualifier::OverlapsWithLocation,
            _ => Qualifier::Other(value),
        }
    }
}

impl From<Qualifier> for String {
    fn from(q: Qualifier) -> Self {
        match q {
            Qualifier::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Kind of record a relationship points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TargetKind {
    Object,
    BehaviorEvent,
    Other(String),
}

impl From<String> for TargetKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "object" => TargetKind::Object,
            "behaviorEvent" => TargetKind::BehaviorEvent,
            _ => TargetKind::Other(value),
        }
    }
}

impl From<TargetKind> for String {
    fn from(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Object => "object".to_string(),
            TargetKind::BehaviorEvent => "behaviorEvent".to_string(),
            TargetKind::Other(value) => value,
        }
    }
}

/// A qualified edge from the record holding it to `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub id: String,
    pub qualifier: Qualifier,
}

impl Relationship {
    pub fn object(id: impl Into<String>, qualifier: Qualifier) -> Self {
        Self {
            kind: TargetKind::Object,
            id: id.into(),
            qualifier,
        }
    }

    pub fn behavior_event(id: impl Into<String>, qualifier: Qualifier) -> Self {
        Self {
            kind: TargetKind::BehaviorEvent,
            id: id.into(),
            qualifier,
        }
    }
}

/// Attribute declaration inside a type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub name: String,
    #[serde(rename = "type", default = "default_attribute_kind")]
    pub kind: String,
}

fn default_attribute_kind() -> String {
    "string".to_string()
}

/// A behavior event type or object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    #[serde(
        default,
        alias = "behaviorEventTypeAttributes",
        alias = "objectTypeAttributes"
    )]
    pub attributes: Vec<AttributeDefinition>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TypeDefinition {
    /// Type with string-valued attributes.
    pub fn with_string_attributes(name: &str, attributes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            attributes: attributes
                .iter()
                .map(|a| AttributeDefinition {
                    name: (*a).to_string(),
                    kind: default_attribute_kind(),
                })
                .collect(),
            extra: Map::new(),
        }
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    /// `location_event`: `lifecycle` and `location_type`.
    pub fn location_event() -> Self {
        Self::with_string_attributes(LOCATION_EVENT_TYPE, &["lifecycle", "location_type"])
    }

    /// `location_segment`: `location_type`, `start_time` and `end_time`.
    pub fn location_segment() -> Self {
        Self::with_string_attributes(
            LOCATION_SEGMENT_TYPE,
            &["location_type", "start_time", "end_time"],
        )
    }

    /// `day`: `date` and `day_of_week`.
    pub fn day() -> Self {
        Self::with_string_attributes(DAY_TYPE, &["date", "day_of_week"])
    }
}

// ============================================================================
// Sensor events
// ============================================================================

/// A raw sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub id: String,
    #[serde(
        rename = "sensorEventType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sensor_event_type: Option<String>,
    #[serde(default)]
    pub time: String,
    #[serde(
        rename = "sensorEventTypeAttributes",
        alias = "attributes",
        default
    )]
    pub attributes: Vec<WireAttribute>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SensorEvent {
    /// Location reading with numeric coordinates.
    pub fn location(
        id: impl Into<String>,
        time: &DateTime<FixedOffset>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: id.into(),
            sensor_event_type: Some(LOCATION_SENSOR_TYPE.to_string()),
            time: time.to_rfc3339(),
            attributes: vec![
                WireAttribute::new("latitude", latitude),
                WireAttribute::new("longitude", longitude),
            ],
            relationships: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Numeric attribute value; numeric strings are accepted.
    pub fn numeric_attribute(&self, name: &str) -> Option<f64> {
        let attribute = find_attribute(&self.attributes, name)?;
        match &attribute.value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl Sample {
    /// Extract a location sample from a sensor event.
    ///
    /// Missing, malformed or out-of-range coordinates yield a no-fix sample.
    /// Returns `None` (with a warning) when the event time cannot be parsed.
    pub fn from_sensor_event(event: &SensorEvent) -> Option<Sample> {
        let timestamp = match parse_timestamp(&event.time) {
            Ok(ts) => ts,
            Err(e) => {
                warn!("[Samples] Skipping sensor event {}: {}", event.id, e);
                return None;
            }
        };

        let point = match (
            event.numeric_attribute("latitude"),
            event.numeric_attribute("longitude"),
        ) {
            (Some(lat), Some(lon)) => GpsPoint::new(lat, lon),
            _ => GpsPoint::NO_FIX,
        };

        Some(if point.is_valid() {
            Sample {
                id: event.id.clone(),
                timestamp,
                point,
            }
        } else {
            Sample::no_fix(event.id.clone(), timestamp)
        })
    }
}

/// Extract samples from sensor events, skipping events with unusable times.
pub fn samples_from_sensor_events<'a>(
    events: impl IntoIterator<Item = &'a SensorEvent>,
) -> Vec<Sample> {
    events
        .into_iter()
        .filter_map(Sample::from_sensor_event)
        .collect()
}

// ============================================================================
// Behavior events
// ============================================================================

/// Behavior event in its loosely typed wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    #[serde(rename = "behaviorEventType")]
    pub event_type: String,
    #[serde(default)]
    pub time: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<WireAttribute>,
    /// Attributes stored under the event type's attribute key
    #[serde(
        rename = "behaviorEventTypeAttributes",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub type_attributes: Vec<WireAttribute>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawEvent {
    pub fn attribute(&self, name: &str) -> Option<&WireAttribute> {
        find_attribute(&self.attributes, name)
            .or_else(|| find_attribute(&self.type_attributes, name))
    }

    /// Set or replace an attribute, keeping the key the event already uses.
    pub fn set_attribute(&mut self, attribute: WireAttribute) {
        if find_attribute(&self.attributes, &attribute.name).is_some()
            || self.type_attributes.is_empty()
        {
            upsert_attribute(&mut self.attributes, attribute);
        } else {
            upsert_attribute(&mut self.type_attributes, attribute);
        }
    }
}

/// Enter or exit side of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Entering,
    Exiting,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Entering => "Entering",
            Lifecycle::Exiting => "Exiting",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Entering" => Some(Lifecycle::Entering),
            "Exiting" => Some(Lifecycle::Exiting),
            _ => None,
        }
    }
}

/// A segment boundary event.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationEvent {
    pub id: String,
    pub time: DateTime<FixedOffset>,
    pub lifecycle: Lifecycle,
    pub location_type: SegmentLabel,
    pub relationships: Vec<Relationship>,
}

impl LocationEvent {
    fn from_raw(raw: RawEvent) -> std::result::Result<Self, RawEvent> {
        if raw.event_type != LOCATION_EVENT_TYPE
            || !raw.extra.is_empty()
            || !raw.type_attributes.is_empty()
            || raw.attributes.len() != 2
        {
            return Err(raw);
        }
        let lifecycle = find_attribute(&raw.attributes, "lifecycle")
            .and_then(WireAttribute::as_str)
            .and_then(Lifecycle::parse);
        let location_type = find_attribute(&raw.attributes, "location_type")
            .and_then(WireAttribute::as_str)
            .map(SegmentLabel::parse);
        let time = parse_timestamp(&raw.time).ok();

        match (lifecycle, location_type, time) {
            (Some(lifecycle), Some(location_type), Some(time)) => Ok(Self {
                id: raw.id,
                time,
                lifecycle,
                location_type,
                relationships: raw.relationships,
            }),
            _ => Err(raw),
        }
    }
}

impl From<LocationEvent> for RawEvent {
    fn from(event: LocationEvent) -> Self {
        RawEvent {
            id: event.id,
            event_type: LOCATION_EVENT_TYPE.to_string(),
            time: event.time.to_rfc3339(),
            attributes: vec![
                WireAttribute::new("lifecycle", event.lifecycle.as_str()),
                WireAttribute::new("location_type", event.location_type.as_str()),
            ],
            type_attributes: Vec::new(),
            relationships: event.relationships,
            extra: Map::new(),
        }
    }
}

/// A behavior event in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEvent", into = "RawEvent")]
pub enum BehaviorEvent {
    Location(LocationEvent),
    Other(RawEvent),
}

impl From<RawEvent> for BehaviorEvent {
    fn from(raw: RawEvent) -> Self {
        match LocationEvent::from_raw(raw) {
            Ok(event) => BehaviorEvent::Location(event),
            Err(raw) => BehaviorEvent::Other(raw),
        }
    }
}

impl From<LocationEvent> for BehaviorEvent {
    fn from(event: LocationEvent) -> Self {
        BehaviorEvent::Location(event)
    }
}

impl From<BehaviorEvent> for RawEvent {
    fn from(event: BehaviorEvent) -> Self {
        match event {
            BehaviorEvent::Location(event) => event.into(),
            BehaviorEvent::Other(raw) => raw,
        }
    }
}

impl BehaviorEvent {
    pub fn id(&self) -> &str {
        match self {
            BehaviorEvent::Location(e) => &e.id,
            BehaviorEvent::Other(e) => &e.id,
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            BehaviorEvent::Location(_) => LOCATION_EVENT_TYPE,
            BehaviorEvent::Other(e) => &e.event_type,
        }
    }

    /// Event time, if it parses.
    pub fn time(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            BehaviorEvent::Location(e) => Some(e.time),
            BehaviorEvent::Other(e) => parse_timestamp(&e.time).ok(),
        }
    }

    pub fn relationships(&self) -> &[Relationship] {
        match self {
            BehaviorEvent::Location(e) => &e.relationships,
            BehaviorEvent::Other(e) => &e.relationships,
        }
    }

    fn relationships_mut(&mut self) -> &mut Vec<Relationship> {
        match self {
            BehaviorEvent::Location(e) => &mut e.relationships,
            BehaviorEvent::Other(e) => &mut e.relationships,
        }
    }

    pub fn as_location(&self) -> Option<&LocationEvent> {
        match self {
            BehaviorEvent::Location(e) => Some(e),
            BehaviorEvent::Other(_) => None,
        }
    }

    /// Attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        match self {
            BehaviorEvent::Location(e) => match name {
                "lifecycle" => Some(Value::from(e.lifecycle.as_str())),
                "location_type" => Some(Value::from(e.location_type.as_str())),
                _ => None,
            },
            BehaviorEvent::Other(e) => e.attribute(name).map(|a| a.value.clone()),
        }
    }

    /// Set or replace an attribute. A location event leaves its typed form
    /// when it gains an attribute it does not model.
    fn set_attribute(&mut self, attribute: WireAttribute) {
        if let BehaviorEvent::Other(raw) = self {
            raw.set_attribute(attribute);
            return;
        }
        let mut raw: RawEvent = self.clone().into();
        raw.set_attribute(attribute);
        *self = BehaviorEvent::from(raw);
    }
}

// ============================================================================
// Objects
// ============================================================================

/// Object in its loosely typed wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObject {
    pub id: String,
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default)]
    pub attributes: Vec<WireAttribute>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawObject {
    fn attribute_time(&self, name: &str) -> Option<DateTime<FixedOffset>> {
        let attribute = find_attribute(&self.attributes, name)?;
        attribute
            .time
            .as_deref()
            .and_then(|t| parse_timestamp(t).ok())
            .or_else(|| attribute.as_str().and_then(|v| parse_timestamp(v).ok()))
    }
}

/// One final segment as stored in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSegmentObject {
    pub id: String,
    pub location_type: SegmentLabel,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub relationships: Vec<Relationship>,
}

impl LocationSegmentObject {
    /// Whether `time` lies within the segment, bounds included.
    pub fn contains(&self, time: &DateTime<FixedOffset>) -> bool {
        self.start <= *time && *time <= self.end
    }

    /// Whether `[start, end]` overlaps the segment.
    pub fn overlaps(&self, start: &DateTime<FixedOffset>, end: &DateTime<FixedOffset>) -> bool {
        self.start <= *end && *start <= self.end
    }

    fn from_raw(raw: RawObject) -> std::result::Result<Self, RawObject> {
        if raw.object_type != LOCATION_SEGMENT_TYPE
            || !raw.extra.is_empty()
            || raw.attributes.len() != 3
        {
            return Err(raw);
        }
        let location_type = find_attribute(&raw.attributes, "location_type")
            .and_then(WireAttribute::as_str)
            .map(SegmentLabel::parse);
        let start = raw.attribute_time("start_time");
        let end = raw.attribute_time("end_time");

        match (location_type, start, end) {
            (Some(location_type), Some(start), Some(end)) => Ok(Self {
                id: raw.id,
                location_type,
                start,
                end,
                relationships: raw.relationships,
            }),
            _ => Err(raw),
        }
    }
}

impl From<LocationSegmentObject> for RawObject {
    fn from(object: LocationSegmentObject) -> Self {
        let start = object.start.to_rfc3339();
        let end = object.end.to_rfc3339();
        RawObject {
            id: object.id,
            object_type: LOCATION_SEGMENT_TYPE.to_string(),
            attributes: vec![
                WireAttribute::new("location_type", object.location_type.as_str())
                    .at(start.clone()),
                WireAttribute::new("start_time", display_time(&object.start)).at(start),
                WireAttribute::new("end_time", display_time(&object.end)).at(end),
            ],
            relationships: object.relationships,
            extra: Map::new(),
        }
    }
}

/// A calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayObject {
    pub id: String,
    pub date: NaiveDate,
    pub day_of_week: String,
    pub relationships: Vec<Relationship>,
}

impl DayObject {
    /// New day object with the English weekday name of `date`.
    pub fn new(id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            date,
            day_of_week: date.format("%A").to_string(),
            relationships: Vec::new(),
        }
    }

    fn from_raw(raw: RawObject) -> std::result::Result<Self, RawObject> {
        if raw.object_type != DAY_TYPE || !raw.extra.is_empty() || raw.attributes.len() != 2 {
            return Err(raw);
        }
        let date = day_attribute_date(&raw.attributes);
        let day_of_week = find_attribute(&raw.attributes, "day_of_week")
            .and_then(WireAttribute::as_str)
            .map(str::to_string);

        match (date, day_of_week) {
            (Some(date), Some(day_of_week)) => Ok(Self {
                id: raw.id,
                date,
                day_of_week,
                relationships: raw.relationships,
            }),
            _ => Err(raw),
        }
    }
}

fn day_attribute_date(attributes: &[WireAttribute]) -> Option<NaiveDate> {
    find_attribute(attributes, "date")
        .and_then(WireAttribute::as_str)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

impl From<DayObject> for RawObject {
    fn from(day: DayObject) -> Self {
        let midnight = format!("{}T00:00:00", day.date.format("%Y-%m-%d"));
        RawObject {
            id: day.id,
            object_type: DAY_TYPE.to_string(),
            attributes: vec![
                WireAttribute::new("date", day.date.format("%Y-%m-%d").to_string())
                    .at(midnight.clone()),
                WireAttribute::new("day_of_week", day.day_of_week).at(midnight),
            ],
            relationships: day.relationships,
            extra: Map::new(),
        }
    }
}

/// An object in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawObject", into = "RawObject")]
pub enum GraphObject {
    LocationSegment(LocationSegmentObject),
    Day(DayObject),
    Other(RawObject),
}

impl From<RawObject> for GraphObject {
    fn from(raw: RawObject) -> Self {
        let raw = match LocationSegmentObject::from_raw(raw) {
            Ok(segment) => return GraphObject::LocationSegment(segment),
            Err(raw) => raw,
        };
        match DayObject::from_raw(raw) {
            Ok(day) => GraphObject::Day(day),
            Err(raw) => GraphObject::Other(raw),
        }
    }
}

impl From<LocationSegmentObject> for GraphObject {
    fn from(object: LocationSegmentObject) -> Self {
        GraphObject::LocationSegment(object)
    }
}

impl From<DayObject> for GraphObject {
    fn from(day: DayObject) -> Self {
        GraphObject::Day(day)
    }
}

impl From<GraphObject> for RawObject {
    fn from(object: GraphObject) -> Self {
        match object {
            GraphObject::LocationSegment(o) => o.into(),
            GraphObject::Day(o) => o.into(),
            GraphObject::Other(o) => o,
        }
    }
}

impl GraphObject {
    pub fn id(&self) -> &str {
        match self {
            GraphObject::LocationSegment(o) => &o.id,
            GraphObject::Day(o) => &o.id,
            GraphObject::Other(o) => &o.id,
        }
    }

    pub fn object_type(&self) -> &str {
        match self {
            GraphObject::LocationSegment(_) => LOCATION_SEGMENT_TYPE,
            GraphObject::Day(_) => DAY_TYPE,
            GraphObject::Other(o) => &o.object_type,
        }
    }

    pub fn relationships(&self) -> &[Relationship] {
        match self {
            GraphObject::LocationSegment(o) => &o.relationships,
            GraphObject::Day(o) => &o.relationships,
            GraphObject::Other(o) => &o.relationships,
        }
    }

    fn relationships_mut(&mut self) -> &mut Vec<Relationship> {
        match self {
            GraphObject::LocationSegment(o) => &mut o.relationships,
            GraphObject::Day(o) => &mut o.relationships,
            GraphObject::Other(o) => &mut o.relationships,
        }
    }

    pub fn as_location_segment(&self) -> Option<&LocationSegmentObject> {
        match self {
            GraphObject::LocationSegment(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_day(&self) -> Option<&DayObject> {
        match self {
            GraphObject::Day(o) => Some(o),
            _ => None,
        }
    }

    /// Date of any `day` object, including ones carrying extra attributes
    /// that keep them in raw form.
    pub fn day_date(&self) -> Option<NaiveDate> {
        match self {
            GraphObject::Day(o) => Some(o.date),
            GraphObject::Other(o) if o.object_type == DAY_TYPE => day_attribute_date(&o.attributes),
            _ => None,
        }
    }

    /// `[start_time, end_time]` of objects that carry them.
    pub fn interval(&self) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        match self {
            GraphObject::LocationSegment(o) => Some((o.start, o.end)),
            GraphObject::Day(_) => None,
            GraphObject::Other(o) => Some((
                o.attribute_time("start_time")?,
                o.attribute_time("end_time")?,
            )),
        }
    }
}

// ============================================================================
// Graph
// ============================================================================

type EdgeKey = (String, Qualifier, String);

/// Serialized form of the graph; missing sections default to empty.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDocument {
    #[serde(default)]
    sensor_events: Vec<SensorEvent>,
    #[serde(default)]
    behavior_events: Vec<BehaviorEvent>,
    #[serde(default)]
    objects: Vec<GraphObject>,
    #[serde(default)]
    behavior_event_types: Vec<TypeDefinition>,
    #[serde(default)]
    object_types: Vec<TypeDefinition>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Object-centric event data graph.
///
/// Records are only added through methods so that the edge index and the
/// id lookups stay consistent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "GraphDocument")]
pub struct OcedGraph {
    sensor_events: Vec<SensorEvent>,
    behavior_events: Vec<BehaviorEvent>,
    objects: Vec<GraphObject>,
    behavior_event_types: Vec<TypeDefinition>,
    object_types: Vec<TypeDefinition>,
    #[serde(flatten)]
    extra: Map<String, Value>,
    #[serde(skip)]
    edges: HashSet<EdgeKey>,
    #[serde(skip)]
    event_positions: HashMap<String, usize>,
    #[serde(skip)]
    object_positions: HashMap<String, usize>,
}

impl From<GraphDocument> for OcedGraph {
    fn from(doc: GraphDocument) -> Self {
        let mut graph = OcedGraph {
            sensor_events: doc.sensor_events,
            behavior_events: doc.behavior_events,
            objects: doc.objects,
            behavior_event_types: doc.behavior_event_types,
            object_types: doc.object_types,
            extra: doc.extra,
            ..OcedGraph::default()
        };
        graph.rebuild_index();
        graph
    }
}

impl OcedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.edges.clear();
        self.event_positions.clear();
        self.object_positions.clear();

        for (i, event) in self.behavior_events.iter().enumerate() {
            self.event_positions.entry(event.id().to_string()).or_insert(i);
            for rel in event.relationships() {
                self.edges
                    .insert((event.id().to_string(), rel.qualifier.clone(), rel.id.clone()));
            }
        }
        for (i, object) in self.objects.iter().enumerate() {
            self.object_positions.entry(object.id().to_string()).or_insert(i);
            for rel in object.relationships() {
                self.edges
                    .insert((object.id().to_string(), rel.qualifier.clone(), rel.id.clone()));
            }
        }
    }

    pub fn sensor_events(&self) -> &[SensorEvent] {
        &self.sensor_events
    }

    /// Sensor events of one `sensorEventType`, or all of them.
    pub fn sensor_events_of_type<'a>(
        &'a self,
        sensor_type: Option<&'a str>,
    ) -> impl Iterator<Item = &'a SensorEvent> + 'a {
        self.sensor_events.iter().filter(move |e| match sensor_type {
            Some(t) => e.sensor_event_type.as_deref() == Some(t),
            None => true,
        })
    }

    /// Sensor events of type `location`, the only ones that carry fixes.
    pub fn location_sensor_events(&self) -> impl Iterator<Item = &SensorEvent> {
        self.sensor_events_of_type(Some(LOCATION_SENSOR_TYPE))
    }

    pub fn behavior_events(&self) -> &[BehaviorEvent] {
        &self.behavior_events
    }

    pub fn objects(&self) -> &[GraphObject] {
        &self.objects
    }

    pub fn behavior_event_types(&self) -> &[TypeDefinition] {
        &self.behavior_event_types
    }

    pub fn object_types(&self) -> &[TypeDefinition] {
        &self.object_types
    }

    pub fn behavior_event(&self, id: &str) -> Option<&BehaviorEvent> {
        self.event_positions.get(id).map(|&i| &self.behavior_events[i])
    }

    pub fn object(&self, id: &str) -> Option<&GraphObject> {
        self.object_positions.get(id).map(|&i| &self.objects[i])
    }

    pub fn location_segments(&self) -> impl Iterator<Item = &LocationSegmentObject> {
        self.objects.iter().filter_map(GraphObject::as_location_segment)
    }

    pub fn day_objects(&self) -> impl Iterator<Item = &DayObject> {
        self.objects.iter().filter_map(GraphObject::as_day)
    }

    pub fn add_sensor_event(&mut self, event: SensorEvent) {
        self.sensor_events.push(event);
    }

    /// Append a behavior event. Returns `false` if the id is already taken.
    pub fn add_behavior_event(&mut self, event: impl Into<BehaviorEvent>) -> bool {
        let event = event.into();
        if self.event_positions.contains_key(event.id()) {
            return false;
        }
        for rel in event.relationships() {
            self.edges
                .insert((event.id().to_string(), rel.qualifier.clone(), rel.id.clone()));
        }
        self.event_positions
            .insert(event.id().to_string(), self.behavior_events.len());
        self.behavior_events.push(event);
        true
    }

    /// Append an object. Returns `false` if the id is already taken.
    pub fn add_object(&mut self, object: impl Into<GraphObject>) -> bool {
        let object = object.into();
        if self.object_positions.contains_key(object.id()) {
            return false;
        }
        for rel in object.relationships() {
            self.edges
                .insert((object.id().to_string(), rel.qualifier.clone(), rel.id.clone()));
        }
        self.object_positions
            .insert(object.id().to_string(), self.objects.len());
        self.objects.push(object);
        true
    }

    pub fn has_relationship(&self, subject: &str, qualifier: &Qualifier, target: &str) -> bool {
        self.edges
            .contains(&(subject.to_string(), qualifier.clone(), target.to_string()))
    }

    pub fn relationship_count(&self) -> usize {
        self.edges.len()
    }

    /// Add an edge from a behavior event. Returns `false` if the event is
    /// unknown or the edge already exists.
    pub fn add_event_relationship(&mut self, event_id: &str, relationship: Relationship) -> bool {
        let Some(&i) = self.event_positions.get(event_id) else {
            return false;
        };
        let key = (event_id.to_string(), relationship.qualifier.clone(), relationship.id.clone());
        if !self.edges.insert(key) {
            return false;
        }
        self.behavior_events[i].relationships_mut().push(relationship);
        true
    }

    /// Add an edge from an object. Returns `false` if the object is unknown
    /// or the edge already exists.
    pub fn add_object_relationship(&mut self, object_id: &str, relationship: Relationship) -> bool {
        let Some(&i) = self.object_positions.get(object_id) else {
            return false;
        };
        let key = (object_id.to_string(), relationship.qualifier.clone(), relationship.id.clone());
        if !self.edges.insert(key) {
            return false;
        }
        self.objects[i].relationships_mut().push(relationship);
        true
    }

    /// Set or replace an attribute of a behavior event.
    pub fn set_event_attribute(&mut self, event_id: &str, attribute: WireAttribute) -> bool {
        match self.event_positions.get(event_id) {
            Some(&i) => {
                self.behavior_events[i].set_attribute(attribute);
                true
            }
            None => false,
        }
    }

    /// Register a behavior event type unless one with that name exists.
    pub fn ensure_behavior_event_type(&mut self, definition: TypeDefinition) -> bool {
        if self.behavior_event_type(&definition.name).is_some() {
            return false;
        }
        self.behavior_event_types.push(definition);
        true
    }

    /// Register an object type unless one with that name exists.
    pub fn ensure_object_type(&mut self, definition: TypeDefinition) -> bool {
        if self.object_types.iter().any(|t| t.name == definition.name) {
            return false;
        }
        self.object_types.push(definition);
        true
    }

    pub fn behavior_event_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.behavior_event_types.iter().find(|t| t.name == name)
    }

    pub fn behavior_event_type_mut(&mut self, name: &str) -> Option<&mut TypeDefinition> {
        self.behavior_event_types.iter_mut().find(|t| t.name == name)
    }
}
