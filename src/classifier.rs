//! Per-sample location state classification.
//!
//! ## Decision order
//! 1. **Invalid GPS**: keep the previous geofence while the invalid run stays
//!    within the threshold, fall back to `Other` for any other previous state,
//!    and report `InvalidGps` once the run exceeds the threshold (or when
//!    there is no previous state at all).
//! 2. **Transit**: a valid fix farther than the transit distance from the
//!    previous valid fix, reached in less than the transit time window.
//! 3. **Geofence membership**: among all geofences containing the point, the
//!    one with the nearest center wins; equal distances go to the geofence
//!    defined first. Otherwise `Other`.

use std::fmt;

use chrono::{DateTime, Duration, FixedOffset};
use rstar::{RTree, RTreeObject, AABB};

use crate::config::{Geofence, SegmentationConfig};
use crate::geo_utils::{haversine_distance, meters_to_degrees};
use crate::GpsPoint;

/// Envelope padding so the degree box always contains the metric circle.
const ENVELOPE_MARGIN: f64 = 1.1;

/// Location state of a single sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocationState {
    Geofence(String),
    InTransit,
    Other,
    InvalidGps,
}

impl LocationState {
    /// Geofence name when the state is a geofence.
    pub fn location_name(&self) -> Option<&str> {
        match self {
            LocationState::Geofence(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for LocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationState::Geofence(name) => write!(f, "geofence({})", name),
            LocationState::InTransit => f.write_str("in_transit"),
            LocationState::Other => f.write_str("other"),
            LocationState::InvalidGps => f.write_str("invalid_gps"),
        }
    }
}

/// Classifier thresholds, resolved once from the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub transit_distance_m: f64,
    pub transit_time: Duration,
    pub invalid_duration: Duration,
}

impl Thresholds {
    pub fn from_config(config: &SegmentationConfig) -> Self {
        Self {
            transit_distance_m: config.transit_distance_threshold_m,
            transit_time: config.transit_time_threshold(),
            invalid_duration: config.invalid_gps_duration_threshold(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_config(&SegmentationConfig::default())
    }
}

/// A valid fix remembered for the transit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub point: GpsPoint,
    pub time: DateTime<FixedOffset>,
}

/// Everything the classifier needs to know about one sample.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub point: GpsPoint,
    pub time: DateTime<FixedOffset>,
    /// The sample carries no usable coordinate
    pub is_invalid: bool,
    /// How long GPS has been unavailable at this sample
    pub invalid_run: Duration,
    /// Last valid fix of the day, if any
    pub prev_fix: Option<&'a Fix>,
    /// State of the currently open segment, if any
    pub prev_state: Option<&'a LocationState>,
}

/// Geofence bounding box for R-tree candidate lookup.
#[derive(Debug, Clone)]
struct GeofenceEnvelope {
    idx: usize,
    min_lat: f64,
    max_lat: f64,
    min_lng: f64,
    max_lng: f64,
}

impl RTreeObject for GeofenceEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.min_lat, self.min_lng], [self.max_lat, self.max_lng])
    }
}

/// Spatial index over the configured geofences.
///
/// Candidates come from the R-tree of degree boxes; membership is then
/// decided exactly with the haversine distance to the center.
#[derive(Debug)]
pub struct GeofenceIndex {
    geofences: Vec<Geofence>,
    tree: RTree<GeofenceEnvelope>,
}

impl GeofenceIndex {
    pub fn new(geofences: &[Geofence]) -> Self {
        let envelopes: Vec<GeofenceEnvelope> = geofences
            .iter()
            .enumerate()
            .map(|(idx, g)| {
                let (lat_span, _) = meters_to_degrees(g.radius * ENVELOPE_MARGIN, g.latitude);
                let min_lat = (g.latitude - lat_span).max(-90.0);
                let max_lat = (g.latitude + lat_span).min(90.0);
                // Widest longitude span occurs at the most poleward latitude of the box
                let ref_lat = min_lat.abs().max(max_lat.abs());
                let (_, lng_span) = meters_to_degrees(g.radius * ENVELOPE_MARGIN, ref_lat);

                let (mut min_lng, mut max_lng) = (g.longitude - lng_span, g.longitude + lng_span);
                if min_lng < -180.0 || max_lng > 180.0 {
                    // Crosses the antimeridian: fall back to the full longitude range
                    min_lng = -180.0;
                    max_lng = 180.0;
                }

                GeofenceEnvelope {
                    idx,
                    min_lat,
                    max_lat,
                    min_lng,
                    max_lng,
                }
            })
            .collect();

        Self {
            geofences: geofences.to_vec(),
            tree: RTree::bulk_load(envelopes),
        }
    }

    pub fn len(&self) -> usize {
        self.geofences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geofences.is_empty()
    }

    /// The containing geofence whose center is nearest to the point.
    pub fn containing(&self, point: &GpsPoint) -> Option<&Geofence> {
        let query = AABB::from_point([point.latitude, point.longitude]);
        let mut best: Option<(f64, usize)> = None;

        for candidate in self.tree.locate_in_envelope_intersecting(&query) {
            let geofence = &self.geofences[candidate.idx];
            let distance = haversine_distance(point, &geofence.center());
            if distance > geofence.radius {
                continue;
            }
            let closer = match best {
                None => true,
                Some((best_distance, best_idx)) => {
                    distance < best_distance
                        || (distance == best_distance && candidate.idx < best_idx)
                }
            };
            if closer {
                best = Some((distance, candidate.idx));
            }
        }

        best.map(|(_, idx)| &self.geofences[idx])
    }
}

/// Classify one sample.
pub fn classify(
    obs: &Observation<'_>,
    geofences: &GeofenceIndex,
    thresholds: &Thresholds,
) -> LocationState {
    if obs.is_invalid {
        let within_threshold = obs.invalid_run <= thresholds.invalid_duration;
        return match obs.prev_state {
            Some(LocationState::Geofence(name)) if within_threshold => {
                LocationState::Geofence(name.clone())
            }
            Some(_) if within_threshold => LocationState::Other,
            _ => LocationState::InvalidGps,
        };
    }

    if let Some(prev) = obs.prev_fix {
        let moved = haversine_distance(&obs.point, &prev.point);
        if moved > thresholds.transit_distance_m && obs.time - prev.time < thresholds.transit_time {
            return LocationState::InTransit;
        }
    }

    match geofences.containing(&obs.point) {
        Some(geofence) => LocationState::Geofence(geofence.name.clone()),
        None => LocationState::Other,
    }
}
