//! Upstream fleet API contract.
//!
//! The [`FleetApi`] trait abstracts the REST surface the engine reads from:
//! vehicle and device records, per-device telemetry, a health probe and a
//! best-effort reverse geocoder. [`HttpFleetApi`] implements it over
//! `reqwest`; tests substitute an in-memory fake.

mod http;
mod retry;

#[cfg(test)]
pub(crate) mod fake;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use http::HttpFleetApi;
pub use retry::{backoff_delay, with_retry, RetryPolicy};

/// Errors returned by the upstream API.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request could not be sent or the connection failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {path}")]
    Status {
        /// Status code.
        status: u16,
        /// Request path.
        path: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type for API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Candidate telemetry endpoint shapes, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryEndpoint {
    /// `GET /telemetry/devices/{id}/latest`
    DeviceLatest,
    /// `GET /telemetry?device_id={id}&limit=1`
    QueryByDevice,
    /// `GET /devices/{id}/telemetry`
    DeviceTelemetry,
}

impl TelemetryEndpoint {
    /// All candidate shapes in priority order.
    pub const ALL: [TelemetryEndpoint; 3] = [
        Self::DeviceLatest,
        Self::QueryByDevice,
        Self::DeviceTelemetry,
    ];

    /// Relative request path for a device.
    #[must_use]
    pub fn path(self, device_id: &str) -> String {
        match self {
            Self::DeviceLatest => format!("/telemetry/devices/{device_id}/latest"),
            Self::QueryByDevice => format!("/telemetry?device_id={device_id}&limit=1"),
            Self::DeviceTelemetry => format!("/devices/{device_id}/telemetry"),
        }
    }
}

/// A vehicle as returned by the fleet API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    /// Vehicle identifier.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Registration plate.
    #[serde(default, alias = "plate", alias = "license_plate")]
    pub registration: Option<String>,
    /// Assigned telemetry device.
    #[serde(default, alias = "deviceId", deserialize_with = "opt_string_or_number")]
    pub device_id: Option<String>,
    /// Last-known latitude.
    #[serde(default, alias = "lat")]
    pub latitude: Option<f64>,
    /// Last-known longitude.
    #[serde(default, alias = "lng", alias = "lon")]
    pub longitude: Option<f64>,
    /// Last-known speed in km/h.
    #[serde(default)]
    pub speed: Option<f64>,
    /// Last-known heading in degrees.
    #[serde(default)]
    pub heading: Option<f64>,
}

/// A telemetry device as returned by the fleet API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device identifier.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Vehicle this device is mounted in.
    #[serde(default, alias = "vehicleId", deserialize_with = "opt_string_or_number")]
    pub vehicle_id: Option<String>,
    /// Last-known latitude.
    #[serde(default, alias = "lat")]
    pub latitude: Option<f64>,
    /// Last-known longitude.
    #[serde(default, alias = "lng", alias = "lon")]
    pub longitude: Option<f64>,
    /// Last-known speed in km/h.
    #[serde(default)]
    pub speed: Option<f64>,
    /// Last-known heading in degrees.
    #[serde(default)]
    pub heading: Option<f64>,
    /// Reported accuracy in metres.
    #[serde(default)]
    pub accuracy: Option<f64>,
}

/// One telemetry reading for a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// Latitude in degrees.
    #[serde(default, alias = "lat")]
    pub latitude: Option<f64>,
    /// Longitude in degrees.
    #[serde(default, alias = "lng", alias = "lon")]
    pub longitude: Option<f64>,
    /// Speed in km/h.
    #[serde(default)]
    pub speed: Option<f64>,
    /// Heading in degrees.
    #[serde(default, alias = "course")]
    pub heading: Option<f64>,
    /// Accuracy in metres.
    #[serde(default)]
    pub accuracy: Option<f64>,
}

/// Read access to the upstream fleet API.
#[async_trait::async_trait]
pub trait FleetApi: Send + Sync + std::fmt::Debug {
    /// List all vehicles.
    async fn list_vehicles(&self) -> ApiResult<Vec<VehicleRecord>>;

    /// Fetch one vehicle.
    async fn vehicle(&self, vehicle_id: &str) -> ApiResult<VehicleRecord>;

    /// List all devices.
    async fn list_devices(&self) -> ApiResult<Vec<DeviceRecord>>;

    /// Fetch one device.
    async fn device(&self, device_id: &str) -> ApiResult<DeviceRecord>;

    /// Fetch the latest telemetry for a device from one endpoint shape.
    async fn telemetry(
        &self,
        endpoint: TelemetryEndpoint,
        device_id: &str,
    ) -> ApiResult<Vec<TelemetryReading>>;

    /// Probe the health endpoint.
    async fn health(&self) -> ApiResult<()>;

    /// Look up a human-readable address for a coordinate.
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> ApiResult<Option<String>>;
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_endpoint_paths() {
        assert_eq!(
            TelemetryEndpoint::DeviceLatest.path("d1"),
            "/telemetry/devices/d1/latest"
        );
        assert_eq!(
            TelemetryEndpoint::QueryByDevice.path("d1"),
            "/telemetry?device_id=d1&limit=1"
        );
        assert_eq!(
            TelemetryEndpoint::DeviceTelemetry.path("d1"),
            "/devices/d1/telemetry"
        );
    }

    #[test]
    fn test_vehicle_record_aliases_and_numeric_ids() {
        let json = r#"{"id": 42, "name": "Van", "plate": "KA-01", "deviceId": 7, "lat": 12.9, "lng": 77.6}"#;
        let v: VehicleRecord = serde_json::from_str(json).unwrap();
        assert_eq!(v.id, "42");
        assert_eq!(v.registration.as_deref(), Some("KA-01"));
        assert_eq!(v.device_id.as_deref(), Some("7"));
        assert_eq!(v.latitude, Some(12.9));
        assert_eq!(v.longitude, Some(77.6));
    }

    #[test]
    fn test_device_record_minimal() {
        let d: DeviceRecord = serde_json::from_str(r#"{"id": "dev-1"}"#).unwrap();
        assert_eq!(d.id, "dev-1");
        assert!(d.vehicle_id.is_none());
        assert!(d.latitude.is_none());
    }

    #[test]
    fn test_device_record_null_vehicle() {
        let d: DeviceRecord =
            serde_json::from_str(r#"{"id": "dev-1", "vehicle_id": null}"#).unwrap();
        assert!(d.vehicle_id.is_none());
    }

    #[test]
    fn test_telemetry_reading_aliases() {
        let r: TelemetryReading =
            serde_json::from_str(r#"{"lat": 1.5, "lon": 2.5, "speed": 30, "course": 90}"#).unwrap();
        assert_eq!(r.latitude, Some(1.5));
        assert_eq!(r.longitude, Some(2.5));
        assert_eq!(r.heading, Some(90.0));
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Status {
            status: 404,
            path: "/vehicles/9".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 404 from /vehicles/9");
        assert!(ApiError::Http("refused".to_string())
            .to_string()
            .contains("refused"));
    }
}
