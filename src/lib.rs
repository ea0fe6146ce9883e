//! # Location Segments
//!
//! Turns raw, irregularly-sampled GPS fixes for one user into a clean,
//! non-overlapping sequence of labeled time segments (a named geofence,
//! in transit, other, or GPS unavailable) and stitches them into an
//! object-centric event data (OCED) graph.
//!
//! This library provides:
//! - A per-sample location state classifier (geofences, transit, invalid GPS)
//! - A per-day segment builder with minimum-duration filtering and
//!   sensor active-period tracking
//! - Day-scoped merging of same-labeled segments and gap filling so that the
//!   final segments of a day exactly tile its active periods
//! - Emission of Enter/Exit events and `location_segment` objects into the graph
//! - Read-only enrichment passes relating other events/objects to locations
//!
//! ## Features
//!
//! - **`parallel`** - Process independent users in parallel with rayon
//! - **`cli`** - Build the `location-segments` command-line tool
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::DateTime;
//! use location_segments::{Geofence, LocationSegmenter, Sample, SegmentationConfig};
//!
//! let config = SegmentationConfig {
//!     geofences: vec![Geofence::new("home", 52.0, 4.0, 100.0)],
//!     ..SegmentationConfig::default()
//! };
//! let segmenter = LocationSegmenter::new(config).unwrap();
//!
//! let t0 = DateTime::parse_from_rfc3339("2024-03-01T08:00:00+00:00").unwrap();
//! let samples: Vec<Sample> = (0..12)
//!     .map(|i| Sample::new(format!("s{i}"), t0 + chrono::Duration::minutes(i), 52.0, 4.0))
//!     .collect();
//!
//! let result = segmenter.segment(&samples);
//! assert_eq!(result.segments.len(), 1);
//! assert_eq!(result.segments[0].label.as_str(), "home");
//! ```

use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, SegmentationError};

// Geographic utilities (haversine distance, meter/degree conversion)
pub mod geo_utils;

// Thresholds, geofences and startup validation
pub mod config;
pub use config::{Geofence, SegmentationConfig};

// Per-sample location state classification
pub mod classifier;
pub use classifier::{classify, GeofenceIndex, LocationState, Observation, Thresholds};

// Per-day scan producing raw segments and active periods
pub mod builder;
pub use builder::{build_day, group_by_day, DaySegments};

// Day-scoped merge of same-labeled segments
pub mod merge;
pub use merge::merge_segments;

// Gap filling over active periods
pub mod gaps;
pub use gaps::fill_gaps;

// Full segmentation pipeline
pub mod pipeline;
pub use pipeline::{refine_segments, LocationSegmenter, SegmentationResult, SegmentationStats};

// OCED graph model and wire format
pub mod oced;
pub use oced::{
    parse_timestamp, samples_from_sensor_events, AttributeDefinition, BehaviorEvent, DayObject,
    GraphObject, Lifecycle, LocationEvent, LocationSegmentObject, OcedGraph, Qualifier, RawEvent,
    RawObject, Relationship, SensorEvent, TargetKind, TypeDefinition, WireAttribute,
    LOCATION_SENSOR_TYPE,
};

// Identifier generation for emitted events/objects
pub mod ids;
pub use ids::{IdGenerator, SequentialIds, UuidGenerator};

// Day-object factory collaborator
pub mod days;
pub use days::{DayObjectFactory, GraphDayFactory};

// Event/object emission
pub mod emitter;
pub use emitter::{emit_segments, EmitSummary};

// Relationship enrichment against emitted segments
pub mod enrich;
pub use enrich::{
    add_location_attribute, relate_events_to_locations, relate_intervals_to_locations,
    relate_objects_to_locations,
};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use location_segments::GpsPoint;
/// let point = GpsPoint::new(52.0907, 5.1214); // Utrecht
/// assert!(point.is_valid());
/// assert!(!GpsPoint::NO_FIX.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Sentinel coordinate reported by the sensor when it has no fix.
    pub const NO_FIX: GpsPoint = GpsPoint {
        latitude: 200.0,
        longitude: 200.0,
    };

    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    ///
    /// The no-fix sentinel is out of range and therefore never valid.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// One location sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Id of the originating sensor event
    pub id: String,
    /// Sample time, keeping the UTC offset it was recorded with
    pub timestamp: DateTime<FixedOffset>,
    /// Reported coordinate (may be [`GpsPoint::NO_FIX`])
    pub point: GpsPoint,
}

impl Sample {
    /// Create a sample with a coordinate.
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            point: GpsPoint::new(latitude, longitude),
        }
    }

    /// Create a sample that carries no GPS fix.
    pub fn no_fix(id: impl Into<String>, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            point: GpsPoint::NO_FIX,
        }
    }

    /// Whether the sample carries a usable coordinate.
    pub fn has_fix(&self) -> bool {
        self.point.is_valid()
    }

    /// Calendar date of the sample in its own UTC offset.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Label of a segment.
///
/// Classifier states map one-to-one onto the first four variants. `Invalid`
/// is reserved for synthesized gap segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SegmentLabel {
    /// Inside the named geofence
    Place(String),
    InTransit,
    Other,
    /// Sensor reported no fix for longer than the tolerated run
    InvalidGps,
    /// Gap in coverage inside an active period
    Invalid,
}

impl SegmentLabel {
    pub const IN_TRANSIT: &'static str = "in_transit";
    pub const OTHER: &'static str = "other";
    pub const INVALID_GPS: &'static str = "invalid_gps";
    pub const INVALID: &'static str = "invalid";

    /// Labels that geofence names may not use.
    pub const RESERVED: [&'static str; 4] = [
        Self::IN_TRANSIT,
        Self::OTHER,
        Self::INVALID_GPS,
        Self::INVALID,
    ];

    /// The wire form of the label (`location_type` attribute value).
    pub fn as_str(&self) -> &str {
        match self {
            SegmentLabel::Place(name) => name,
            SegmentLabel::InTransit => Self::IN_TRANSIT,
            SegmentLabel::Other => Self::OTHER,
            SegmentLabel::InvalidGps => Self::INVALID_GPS,
            SegmentLabel::Invalid => Self::INVALID,
        }
    }

    /// Parse a wire label. Anything that is not a reserved label is a place.
    pub fn parse(label: &str) -> Self {
        match label {
            Self::IN_TRANSIT => SegmentLabel::InTransit,
            Self::OTHER => SegmentLabel::Other,
            Self::INVALID_GPS => SegmentLabel::InvalidGps,
            Self::INVALID => SegmentLabel::Invalid,
            name => SegmentLabel::Place(name.to_string()),
        }
    }
}

impl From<LocationState> for SegmentLabel {
    fn from(state: LocationState) -> Self {
        match state {
            LocationState::Geofence(name) => SegmentLabel::Place(name),
            LocationState::InTransit => SegmentLabel::InTransit,
            LocationState::Other => SegmentLabel::Other,
            LocationState::InvalidGps => SegmentLabel::InvalidGps,
        }
    }
}

impl From<String> for SegmentLabel {
    fn from(label: String) -> Self {
        SegmentLabel::parse(&label)
    }
}

impl From<SegmentLabel> for String {
    fn from(label: SegmentLabel) -> Self {
        label.as_str().to_string()
    }
}

impl fmt::Display for SegmentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A labeled time interval.
///
/// Used for raw, merged and final segments alike; the pipeline stage
/// determines which invariants hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub label: SegmentLabel,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// Sample the segment starts at (for `derived_from` on the Enter event)
    pub start_sample: String,
    /// Sample the segment ends at (for `derived_from` on the Exit event)
    pub end_sample: String,
}

impl Segment {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Calendar date of the segment start.
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

/// A maximal span of a day during which samples kept arriving with gaps no
/// longer than the configured active-period gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePeriod {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// First sample of the period
    pub first_sample: String,
    /// Last sample of the period
    pub last_sample: String,
}

impl ActivePeriod {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

// ============================================================================
// Tests
// ============================================================================
