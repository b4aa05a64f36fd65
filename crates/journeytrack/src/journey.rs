//! Core journey types for journeytrack.
//!
//! This module defines the journey record and the route points and alerts it
//! accumulates while a vehicle is tracked.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo;
use crate::summary::JourneySummary;

/// Where a route point's coordinates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    /// Latest telemetry reading for the vehicle's device.
    Telemetry,
    /// The device's own last-known position.
    Device,
    /// The vehicle's own last-known position.
    Vehicle,
    /// The local geolocation capability.
    Geolocation,
    /// The in-memory cache of the last resolved position.
    Cache,
    /// The fixed fallback coordinate.
    Default,
    /// Dead-reckoning projection from the previous point.
    Estimated,
}

impl PositionSource {
    /// Every source tag, in resolution priority order.
    pub const ALL: [PositionSource; 7] = [
        Self::Telemetry,
        Self::Device,
        Self::Vehicle,
        Self::Geolocation,
        Self::Cache,
        Self::Default,
        Self::Estimated,
    ];

    /// The lowercase tag used in exports and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::Device => "device",
            Self::Vehicle => "vehicle",
            Self::Geolocation => "geolocation",
            Self::Cache => "cache",
            Self::Default => "default",
            Self::Estimated => "estimated",
        }
    }

    /// Whether this source reflects a fresh reading from the upstream API.
    #[must_use]
    pub fn is_live_api(self) -> bool {
        matches!(self, Self::Telemetry | Self::Device | Self::Vehicle)
    }
}

impl std::fmt::Display for PositionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Lifecycle state of a journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStatus {
    /// The vehicle is being tracked.
    Active,
    /// Tracking stopped; the record is frozen.
    Completed,
}

/// Severity of a driving or data-quality alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Low,
    /// Worth reviewing.
    Medium,
    /// Unsafe driving.
    High,
}

/// A bare coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// What an alert is about, with its type-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    /// Speed above the configured limit.
    Speeding {
        /// Observed speed in km/h.
        speed: f64,
        /// Limit in km/h.
        speed_limit: f64,
    },
    /// Speed gained too quickly.
    HarshAcceleration {
        /// Rate of change in km/h per second.
        acceleration: f64,
    },
    /// Speed lost too quickly.
    HarshBraking {
        /// Rate of change in km/h per second (negative).
        acceleration: f64,
    },
    /// The point was not a real fix.
    DataQuality {
        /// Human-readable note.
        message: String,
    },
}

impl AlertKind {
    /// The snake_case type tag.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Speeding { .. } => "speeding",
            Self::HarshAcceleration { .. } => "harsh_acceleration",
            Self::HarshBraking { .. } => "harsh_braking",
            Self::DataQuality { .. } => "data_quality",
        }
    }
}

/// A safety or data-quality event raised between two route points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// The alert type and its fields.
    #[serde(flatten)]
    pub kind: AlertKind,
    /// When the triggering point was recorded.
    pub timestamp: DateTime<Utc>,
    /// Where the triggering point was recorded.
    pub location: Location,
    /// How serious this is.
    pub severity: Severity,
}

/// One admitted position sample within a journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// When the position was resolved.
    pub timestamp: DateTime<Utc>,
    /// Speed in km/h.
    pub speed: f64,
    /// Heading in degrees clockwise from north.
    pub heading: f64,
    /// Reported accuracy radius in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Which source produced the coordinates.
    pub source: PositionSource,
    /// Haversine distance from the previous point in km.
    pub distance_from_previous: f64,
    /// Reverse-geocoded address, when one was looked up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl RoutePoint {
    /// The point's coordinates.
    #[must_use]
    pub fn location(&self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Haversine distance to another point in km.
    #[must_use]
    pub fn distance_to(&self, other: &RoutePoint) -> f64 {
        geo::haversine_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Snapshot of the tracked vehicle taken when the journey started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInfo {
    /// Vehicle identifier.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Registration / licence plate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<String>,
    /// Assigned telemetry device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl VehicleInfo {
    /// A snapshot carrying only the identifier.
    #[must_use]
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// The most human-friendly label available.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.registration.as_deref())
            .unwrap_or(&self.id)
    }
}

/// One continuous tracked trip for a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    /// Unique identifier (UUID v4).
    pub journey_id: String,
    /// The tracked vehicle.
    pub vehicle_id: String,
    /// Timestamp of the seed point.
    pub start_time: DateTime<Utc>,
    /// Set when the journey is completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Lifecycle state.
    pub status: JourneyStatus,
    /// Admitted points, timestamp-ascending.
    pub route_points: Vec<RoutePoint>,
    /// Running sum of pairwise distances in km.
    pub total_distance: f64,
    /// Highest point speed in km/h.
    pub max_speed: f64,
    /// Mean point speed in km/h.
    pub avg_speed: f64,
    /// Alerts raised so far, in order.
    pub alerts: Vec<Alert>,
    /// Every source tag that contributed a point.
    pub data_sources_used: BTreeSet<PositionSource>,
    /// Whether any point was admitted while in fallback mode.
    pub fallback_mode_used: bool,
    /// Vehicle snapshot at start.
    pub vehicle_info: VehicleInfo,
    /// Populated once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<JourneySummary>,
}

impl Journey {
    /// Start a new active journey from its seed point.
    #[must_use]
    pub fn begin(vehicle_info: VehicleInfo, mut seed: RoutePoint) -> Self {
        seed.distance_from_previous = 0.0;
        let mut data_sources_used = BTreeSet::new();
        data_sources_used.insert(seed.source);

        Self {
            journey_id: Uuid::new_v4().to_string(),
            vehicle_id: vehicle_info.id.clone(),
            start_time: seed.timestamp,
            end_time: None,
            status: JourneyStatus::Active,
            total_distance: 0.0,
            max_speed: seed.speed,
            avg_speed: seed.speed,
            route_points: vec![seed],
            alerts: Vec::new(),
            data_sources_used,
            fallback_mode_used: false,
            vehicle_info,
            summary: None,
        }
    }

    /// Whether the journey is still accepting points.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == JourneyStatus::Active
    }

    /// The most recently admitted point.
    #[must_use]
    pub fn last_point(&self) -> Option<&RoutePoint> {
        self.route_points.last()
    }

    /// Append a point and update the running aggregates.
    ///
    /// Returns `false` without touching the journey if it is completed or the
    /// point is older than the last one.
    pub fn append_point(&mut self, mut point: RoutePoint) -> bool {
        if !self.is_active() {
            return false;
        }
        if let Some(last) = self.route_points.last() {
            if point.timestamp < last.timestamp {
                return false;
            }
            point.distance_from_previous = last.distance_to(&point);
        } else {
            point.distance_from_previous = 0.0;
        }

        self.total_distance += point.distance_from_previous;
        self.max_speed = self.max_speed.max(point.speed);
        #[allow(clippy::cast_precision_loss)]
        let n = (self.route_points.len() + 1) as f64;
        self.avg_speed += (point.speed - self.avg_speed) / n;
        self.data_sources_used.insert(point.source);
        self.route_points.push(point);
        true
    }

    /// Append alerts raised for the latest point.
    pub fn record_alerts(&mut self, alerts: impl IntoIterator<Item = Alert>) {
        if self.is_active() {
            self.alerts.extend(alerts);
        }
    }

    /// Freeze the journey.
    pub fn complete(&mut self, end_time: DateTime<Utc>, summary: JourneySummary) {
        self.status = JourneyStatus::Completed;
        self.end_time = Some(end_time);
        self.summary = Some(summary);
    }

    /// Point counts keyed by source.
    #[must_use]
    pub fn points_by_source(&self) -> BTreeMap<PositionSource, usize> {
        let mut counts = BTreeMap::new();
        for point in &self.route_points {
            *counts.entry(point.source).or_insert(0) += 1;
        }
        counts
    }

    /// Label used for file names and display.
    #[must_use]
    pub fn vehicle_label(&self) -> &str {
        self.vehicle_info.label()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{PositionSource, RoutePoint};

    pub fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    pub fn point(lat: f64, lon: f64, secs: i64, speed: f64) -> RoutePoint {
        RoutePoint {
            latitude: lat,
            longitude: lon,
            timestamp: base_time() + Duration::seconds(secs),
            speed,
            heading: 0.0,
            accuracy: Some(10.0),
            source: PositionSource::Telemetry,
            distance_from_previous: 0.0,
            address: None,
        }
    }
}
