//! `reqwest`-backed implementation of [`FleetApi`].

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::{
    ApiError, ApiResult, DeviceRecord, FleetApi, TelemetryEndpoint, TelemetryReading,
    VehicleRecord,
};

/// Keys under which list endpoints wrap their payload.
const ENVELOPE_KEYS: &[&str] = &["data", "items", "results", "readings", "vehicles", "devices"];

/// Fleet API client over HTTP.
///
/// Uses one reusable `reqwest::Client` with a request timeout.
#[derive(Debug, Clone)]
pub struct HttpFleetApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpFleetApi {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("journeytrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// The API root this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json(&self, path: &str) -> ApiResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        trace!(url = %url, "HTTP GET request starting");

        let response = self.http.get(&url).send().await.map_err(|e| {
            warn!(
                url = %url,
                error = %e,
                is_connect = e.is_connect(),
                is_timeout = e.is_timeout(),
                "HTTP request failed"
            );
            ApiError::Http(e.to_string())
        })?;

        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "HTTP response received");
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl FleetApi for HttpFleetApi {
    async fn list_vehicles(&self) -> ApiResult<Vec<VehicleRecord>> {
        extract_list(self.get_json("/vehicles").await?)
    }

    async fn vehicle(&self, vehicle_id: &str) -> ApiResult<VehicleRecord> {
        extract_one(self.get_json(&format!("/vehicles/{vehicle_id}")).await?)
    }

    async fn list_devices(&self) -> ApiResult<Vec<DeviceRecord>> {
        extract_list(self.get_json("/devices").await?)
    }

    async fn device(&self, device_id: &str) -> ApiResult<DeviceRecord> {
        extract_one(self.get_json(&format!("/devices/{device_id}")).await?)
    }

    async fn telemetry(
        &self,
        endpoint: TelemetryEndpoint,
        device_id: &str,
    ) -> ApiResult<Vec<TelemetryReading>> {
        extract_list(self.get_json(&endpoint.path(device_id)).await?)
    }

    async fn health(&self) -> ApiResult<()> {
        self.get_json("/health").await.map(|_| ())
    }

    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> ApiResult<Option<String>> {
        let value = self
            .get_json(&format!("/geocode/reverse?lat={latitude}&lng={longitude}"))
            .await?;
        Ok(extract_address(&value))
    }
}

/// Decode a list payload that may be a bare array, an enveloped array, or a
/// single object.
pub(crate) fn extract_list<T: DeserializeOwned>(value: Value) -> ApiResult<Vec<T>> {
    let items = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let key = ENVELOPE_KEYS
                .iter()
                .find(|key| matches!(map.get(**key), Some(Value::Array(_))));
            match key.and_then(|key| map.remove(*key)) {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(map)],
            }
        }
        other => {
            return Err(ApiError::Decode(format!(
                "expected array or object, got {other}"
            )))
        }
    };
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(|e| ApiError::Decode(e.to_string())))
        .collect()
}

/// Decode a single record, unwrapping a `data` envelope if present.
pub(crate) fn extract_one<T: DeserializeOwned>(value: Value) -> ApiResult<T> {
    let value = match value {
        Value::Object(mut map) if matches!(map.get("data"), Some(Value::Object(_))) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

fn extract_address(value: &Value) -> Option<String> {
    ["address", "display_name", "formatted_address"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}
