//! Segmentation configuration: geofences, thresholds and startup validation.
//!
//! All thresholds are supplied externally. Validation happens once, when a
//! [`LocationSegmenter`](crate::LocationSegmenter) is built, so that the scan
//! itself never discovers a bad configuration halfway through.
//!
//! ## JSON form
//! ```json
//! {
//!   "geofences": {
//!     "home": { "latitude": 52.00, "longitude": 4.00, "radius": 100.0 },
//!     "work": { "latitude": 52.10, "longitude": 4.10, "radius": 100.0 }
//!   },
//!   "transit_distance_threshold_m": 50.0,
//!   "transit_time_threshold_secs": 120,
//!   "min_segment_duration_secs": 300,
//!   "invalid_gps_duration_threshold_secs": 1800,
//!   "default_home_geofence": "home"
//! }
//! ```
//! Geofences may also be given as a list of `{name, latitude, longitude, radius}`.
//! Map order is preserved; it is the tie-break order for equidistant centers.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use chrono::Duration;
use log::warn;
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SegmentationError};
use crate::{GpsPoint, SegmentLabel};

/// Upper bound for any duration threshold (ten years).
const MAX_THRESHOLD_SECS: u64 = 10 * 365 * 24 * 3600;

/// A named circular region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub name: String,
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    pub longitude: f64,
    /// Radius in meters
    #[serde(alias = "radius_m")]
    pub radius: f64,
}

impl Geofence {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, radius: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            radius,
        }
    }

    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Geofence body in the map form, keyed by name.
#[derive(Serialize, Deserialize)]
struct GeofenceEntry {
    #[serde(alias = "lat")]
    latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    longitude: f64,
    #[serde(alias = "radius_m")]
    radius: f64,
}

/// Configuration for the segmentation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Known places, in definition order
    #[serde(
        deserialize_with = "deserialize_geofences",
        serialize_with = "serialize_geofences"
    )]
    pub geofences: Vec<Geofence>,

    /// Distance between consecutive fixes above which the user is in transit.
    /// Default: 50.0 meters
    pub transit_distance_threshold_m: f64,

    /// Time window within which the transit distance must be covered.
    /// Default: 120 seconds
    pub transit_time_threshold_secs: u64,

    /// Segments shorter than this are dropped.
    /// Default: 300 seconds
    pub min_segment_duration_secs: u64,

    /// How long a run of invalid GPS may keep the previous place.
    /// Default: 1800 seconds
    pub invalid_gps_duration_threshold_secs: u64,

    /// Largest gap between samples that still extends an active period.
    /// Default: 300 seconds
    pub active_period_gap_secs: u64,

    /// Geofence assumed when a day starts without a fix.
    /// Default: "home"
    pub default_home_geofence: String,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            geofences: Vec::new(),
            transit_distance_threshold_m: 50.0,
            transit_time_threshold_secs: 120,
            min_segment_duration_secs: 300,
            invalid_gps_duration_threshold_secs: 1800,
            active_period_gap_secs: 300,
            default_home_geofence: "home".to_string(),
        }
    }
}

impl SegmentationConfig {
    /// Parse a configuration from JSON. The result is not yet validated.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a configuration from a JSON file. The result is not yet validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn transit_time_threshold(&self) -> Duration {
        seconds(self.transit_time_threshold_secs)
    }

    pub fn min_segment_duration(&self) -> Duration {
        seconds(self.min_segment_duration_secs)
    }

    pub fn invalid_gps_duration_threshold(&self) -> Duration {
        seconds(self.invalid_gps_duration_threshold_secs)
    }

    pub fn active_period_gap(&self) -> Duration {
        seconds(self.active_period_gap_secs)
    }

    /// Check the configuration for programmer/config errors.
    pub fn validate(&self) -> Result<()> {
        if !self.transit_distance_threshold_m.is_finite() || self.transit_distance_threshold_m < 0.0
        {
            return Err(SegmentationError::config(format!(
                "transit_distance_threshold_m must be a non-negative number, got {}",
                self.transit_distance_threshold_m
            )));
        }

        for (name, secs) in [
            ("transit_time_threshold_secs", self.transit_time_threshold_secs),
            ("min_segment_duration_secs", self.min_segment_duration_secs),
            (
                "invalid_gps_duration_threshold_secs",
                self.invalid_gps_duration_threshold_secs,
            ),
            ("active_period_gap_secs", self.active_period_gap_secs),
        ] {
            if secs > MAX_THRESHOLD_SECS {
                return Err(SegmentationError::config(format!(
                    "{} must be at most {} seconds, got {}",
                    name, MAX_THRESHOLD_SECS, secs
                )));
            }
        }

        if self.active_period_gap_secs == 0 {
            return Err(SegmentationError::config(
                "active_period_gap_secs must be positive",
            ));
        }

        if self.default_home_geofence.trim().is_empty() {
            return Err(SegmentationError::config(
                "default_home_geofence must not be empty",
            ));
        }

        let mut seen = HashSet::new();
        for geofence in &self.geofences {
            if geofence.name.trim().is_empty() {
                return Err(SegmentationError::config("geofence names must not be empty"));
            }
            if SegmentLabel::RESERVED.contains(&geofence.name.as_str()) {
                return Err(SegmentationError::config(format!(
                    "geofence name '{}' is a reserved label",
                    geofence.name
                )));
            }
            if !seen.insert(geofence.name.as_str()) {
                return Err(SegmentationError::config(format!(
                    "duplicate geofence '{}'",
                    geofence.name
                )));
            }
            if !geofence.center().is_valid() {
                return Err(SegmentationError::config(format!(
                    "geofence '{}' has an invalid center ({}, {})",
                    geofence.name, geofence.latitude, geofence.longitude
                )));
            }
            if !geofence.radius.is_finite() || geofence.radius <= 0.0 {
                return Err(SegmentationError::config(format!(
                    "geofence '{}' radius must be positive, got {}",
                    geofence.name, geofence.radius
                )));
            }
        }

        if !seen.contains(self.default_home_geofence.as_str()) {
            warn!(
                "[Config] Default home geofence '{}' is not among the {} configured geofences",
                self.default_home_geofence,
                self.geofences.len()
            );
        }

        Ok(())
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_THRESHOLD_SECS) as i64)
}

fn deserialize_geofences<'de, D>(deserializer: D) -> std::result::Result<Vec<Geofence>, D::Error>
where
    D: Deserializer<'de>,
{
    struct GeofencesVisitor;

    impl<'de> Visitor<'de> for GeofencesVisitor {
        type Value = Vec<Geofence>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of geofences keyed by name, or a list of geofences")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut geofences = Vec::new();
            while let Some((name, entry)) = map.next_entry::<String, GeofenceEntry>()? {
                geofences.push(Geofence::new(name, entry.latitude, entry.longitude, entry.radius));
            }
            Ok(geofences)
        }

        fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut geofences = Vec::new();
            while let Some(geofence) = seq.next_element::<Geofence>()? {
                geofences.push(geofence);
            }
            Ok(geofences)
        }
    }

    deserializer.deserialize_any(GeofencesVisitor)
}

fn serialize_geofences<S>(
    geofences: &[Geofence],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(geofences.iter().map(|g| {
        (
            g.name.as_str(),
            GeofenceEntry {
                latitude: g.latitude,
                longitude: g.longitude,
                radius: g.radius,
            },
        )
    }))
}
