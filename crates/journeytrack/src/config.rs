//! Configuration management for journeytrack.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::alerts::{
    AlertThresholds, DEFAULT_HARSH_ACCELERATION, DEFAULT_HARSH_BRAKING, DEFAULT_SPEED_LIMIT_KMH,
};
use crate::api::RetryPolicy;
use crate::dead_reckoning::DEFAULT_SPEED_DECAY;
use crate::error::{Error, Result};
use crate::geo;
use crate::journey::Location;
use crate::manager::TrackingSettings;
use crate::resolver::{Fix, ResolverSettings};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "journeytrack";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "journeys.db";

/// Default export directory name.
const EXPORT_DIR_NAME: &str = "exports";

/// Environment variable prefix.
const ENV_PREFIX: &str = "JOURNEYTRACK_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `JOURNEYTRACK_`, sections split
///    by `__`, e.g. `JOURNEYTRACK_API__BASE_URL`)
/// 2. TOML config file at `~/.config/journeytrack/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream API configuration.
    pub api: ApiConfig,
    /// Poll loop and admission configuration.
    pub tracking: TrackingConfig,
    /// Health probe configuration.
    pub health: HealthConfig,
    /// Alert thresholds.
    pub alerts: AlertsConfig,
    /// Local geolocation fix.
    pub geolocation: GeolocationConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Export configuration.
    pub export: ExportConfig,
}

/// Upstream fleet API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Root URL of the fleet API.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Attempts for list calls (vehicles, devices).
    pub list_retry_attempts: u32,
    /// Delay before the first list retry in milliseconds.
    pub list_retry_base_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            request_timeout_secs: 10,
            list_retry_attempts: 3,
            list_retry_base_delay_ms: 500,
        }
    }
}

/// Poll loop and point admission configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Seconds between ticks in normal mode.
    pub poll_interval_secs: u64,
    /// Seconds between ticks in fallback mode.
    pub fallback_poll_interval_secs: u64,
    /// Movement in metres that admits a point.
    pub min_distance_m: f64,
    /// Speed change in km/h that admits a point.
    pub min_speed_change_kmh: f64,
    /// Seconds after which a point is admitted regardless.
    pub max_point_gap_secs: u64,
    /// Speed multiplier applied to each dead-reckoned point.
    pub dead_reckoning_decay: f64,
    /// Maximum age of a cached position in seconds.
    pub cache_max_age_secs: u64,
    /// Latitude of the last-resort coordinate.
    pub default_latitude: f64,
    /// Longitude of the last-resort coordinate.
    pub default_longitude: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            fallback_poll_interval_secs: 30,
            min_distance_m: 10.0,
            min_speed_change_kmh: 5.0,
            max_point_gap_secs: 300,
            dead_reckoning_decay: DEFAULT_SPEED_DECAY,
            cache_max_age_secs: 300,
            default_latitude: 28.6139,
            default_longitude: 77.2090,
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds between probes.
    pub probe_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 30,
        }
    }
}

/// Alert threshold configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Speed limit in km/h.
    pub speed_limit_kmh: f64,
    /// Harsh acceleration threshold in km/h per second.
    pub harsh_acceleration_kmh_per_s: f64,
    /// Harsh braking threshold in km/h per second (negative).
    pub harsh_braking_kmh_per_s: f64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            speed_limit_kmh: DEFAULT_SPEED_LIMIT_KMH,
            harsh_acceleration_kmh_per_s: DEFAULT_HARSH_ACCELERATION,
            harsh_braking_kmh_per_s: DEFAULT_HARSH_BRAKING,
        }
    }
}

/// Fixed local geolocation. Unset means no geolocation capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    /// Latitude of this host.
    pub latitude: Option<f64>,
    /// Longitude of this host.
    pub longitude: Option<f64>,
    /// Accuracy radius in metres.
    pub accuracy_m: Option<f64>,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/journeytrack/journeys.db`
    pub database_path: Option<PathBuf>,
}

/// Export-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory exports are written to.
    /// Defaults to `~/.local/share/journeytrack/exports`
    pub output_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::ConfigValidation { message });

        if self.api.base_url.trim().is_empty() {
            return invalid("api.base_url must not be empty".to_string());
        }
        for (name, value) in [
            ("api.request_timeout_secs", self.api.request_timeout_secs),
            ("tracking.poll_interval_secs", self.tracking.poll_interval_secs),
            (
                "tracking.fallback_poll_interval_secs",
                self.tracking.fallback_poll_interval_secs,
            ),
            ("tracking.max_point_gap_secs", self.tracking.max_point_gap_secs),
            ("health.probe_interval_secs", self.health.probe_interval_secs),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be greater than 0"));
            }
        }
        if self.api.list_retry_attempts == 0 {
            return invalid("api.list_retry_attempts must be at least 1".to_string());
        }
        if !(self.tracking.min_distance_m >= 0.0 && self.tracking.min_speed_change_kmh >= 0.0) {
            return invalid("tracking admission thresholds must not be negative".to_string());
        }

        let decay = self.tracking.dead_reckoning_decay;
        if !(decay > 0.0 && decay <= 1.0) {
            return invalid(format!(
                "tracking.dead_reckoning_decay ({decay}) must be in (0, 1]"
            ));
        }
        if !geo::is_valid_coordinate(self.tracking.default_latitude, self.tracking.default_longitude)
        {
            return invalid(format!(
                "default coordinate ({}, {}) is out of range",
                self.tracking.default_latitude, self.tracking.default_longitude
            ));
        }

        if !(self.alerts.speed_limit_kmh > 0.0) {
            return invalid("alerts.speed_limit_kmh must be positive".to_string());
        }
        if !(self.alerts.harsh_acceleration_kmh_per_s > 0.0) {
            return invalid("alerts.harsh_acceleration_kmh_per_s must be positive".to_string());
        }
        if !(self.alerts.harsh_braking_kmh_per_s < 0.0) {
            return invalid("alerts.harsh_braking_kmh_per_s must be negative".to_string());
        }

        match (self.geolocation.latitude, self.geolocation.longitude) {
            (Some(lat), Some(lng)) if !geo::is_valid_coordinate(lat, lng) => {
                return invalid(format!("geolocation ({lat}, {lng}) is out of range"));
            }
            (Some(_), None) | (None, Some(_)) => {
                return invalid(
                    "geolocation requires both latitude and longitude".to_string(),
                );
            }
            _ => {}
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the export directory, resolving defaults if not set.
    #[must_use]
    pub fn export_dir(&self) -> PathBuf {
        self.export
            .output_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(EXPORT_DIR_NAME))
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// Get the health probe interval as a Duration.
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.health.probe_interval_secs)
    }

    /// Retry policy for list calls.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.api.list_retry_attempts,
            base_delay: Duration::from_millis(self.api.list_retry_base_delay_ms),
            ..RetryPolicy::default()
        }
    }

    /// The configured local geolocation fix, if any.
    #[must_use]
    pub fn geolocation_fix(&self) -> Option<Fix> {
        let (latitude, longitude) = (self.geolocation.latitude?, self.geolocation.longitude?);
        Some(Fix {
            accuracy: self.geolocation.accuracy_m,
            ..Fix::at(latitude, longitude)
        })
    }

    /// Settings for the position resolver.
    #[must_use]
    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            cache_max_age: chrono::Duration::seconds(
                i64::try_from(self.tracking.cache_max_age_secs).unwrap_or(i64::MAX),
            ),
            default_location: Location {
                latitude: self.tracking.default_latitude,
                longitude: self.tracking.default_longitude,
            },
            retry: self.retry_policy(),
        }
    }

    /// Alert thresholds.
    #[must_use]
    pub fn alert_thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            speed_limit_kmh: self.alerts.speed_limit_kmh,
            harsh_acceleration: self.alerts.harsh_acceleration_kmh_per_s,
            harsh_braking: self.alerts.harsh_braking_kmh_per_s,
        }
    }

    /// Poll loop and admission settings.
    #[must_use]
    pub fn tracking_settings(&self) -> TrackingSettings {
        TrackingSettings {
            poll_interval: Duration::from_secs(self.tracking.poll_interval_secs),
            fallback_poll_interval: Duration::from_secs(self.tracking.fallback_poll_interval_secs),
            min_distance_km: self.tracking.min_distance_m / 1000.0,
            min_speed_change_kmh: self.tracking.min_speed_change_kmh,
            max_point_gap: chrono::Duration::seconds(
                i64::try_from(self.tracking.max_point_gap_secs).unwrap_or(i64::MAX),
            ),
            dead_reckoning_decay: self.tracking.dead_reckoning_decay,
            retry: self.retry_policy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.tracking.poll_interval_secs, 10);
        assert_eq!(config.tracking.fallback_poll_interval_secs, 30);
        assert_eq!(config.health.probe_interval_secs, 30);
        assert!((config.alerts.speed_limit_kmh - 60.0).abs() < f64::EPSILON);
        assert!((config.tracking.dead_reckoning_decay - 0.95).abs() < f64::EPSILON);
        assert!(config.geolocation.latitude.is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = Config::default();
        config.tracking.poll_interval_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("tracking.poll_interval_secs"));
    }

    #[test]
    fn test_validate_decay_range() {
        let mut config = Config::default();
        config.tracking.dead_reckoning_decay = 0.0;
        assert!(config.validate().is_err());

        config.tracking.dead_reckoning_decay = 1.5;
        assert!(config.validate().is_err());

        config.tracking.dead_reckoning_decay = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_alert_thresholds() {
        let mut config = Config::default();
        config.alerts.speed_limit_kmh = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.alerts.harsh_braking_kmh_per_s = 10.0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("harsh_braking"));
    }

    #[test]
    fn test_validate_default_coordinate() {
        let mut config = Config::default();
        config.tracking.default_latitude = 95.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_partial_geolocation() {
        let mut config = Config::default();
        config.geolocation.latitude = Some(12.0);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("both latitude and longitude"));

        config.geolocation.longitude = Some(77.0);
        assert!(config.validate().is_ok());
        let fix = config.geolocation_fix().unwrap();
        assert!((fix.latitude - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("journeys.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));
        assert_eq!(config.database_path(), PathBuf::from("/custom/path/db.sqlite"));
    }

    #[test]
    fn test_export_dir_default() {
        let path = Config::default().export_dir();
        assert!(path.ends_with("journeytrack/exports"));
    }

    #[test]
    fn test_derived_settings() {
        let config = Config::default();

        let tracking = config.tracking_settings();
        assert_eq!(tracking.poll_interval, Duration::from_secs(10));
        assert!((tracking.min_distance_km - 0.01).abs() < 1e-12);
        assert_eq!(tracking.max_point_gap, chrono::Duration::minutes(5));

        let resolver = config.resolver_settings();
        assert_eq!(resolver.cache_max_age, chrono::Duration::minutes(5));
        assert!((resolver.default_location.latitude - 28.6139).abs() < f64::EPSILON);

        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.alert_thresholds(), AlertThresholds::default());
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("journeytrack"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[api]
base_url = "https://fleet.example.com/v2"

[tracking]
poll_interval_secs = 5

[alerts]
speed_limit_kmh = 80.0
"#
        )
        .unwrap();

        let config = Config::load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.api.base_url, "https://fleet.example.com/v2");
        assert_eq!(config.tracking.poll_interval_secs, 5);
        assert_eq!(config.tracking.fallback_poll_interval_secs, 30);
        assert!((config.alerts.speed_limit_kmh - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tracking]\ndead_reckoning_decay = 2.0").unwrap();

        let err = Config::load_from(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_config_roundtrips_through_toml_shape() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("poll_interval_secs"));
        assert!(json.contains("speed_limit_kmh"));
    }
}
