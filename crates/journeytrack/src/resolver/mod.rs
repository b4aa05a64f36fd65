//! Multi-source position resolution.
//!
//! A [`PositionResolver`] walks an ordered list of [`LocationStrategy`]
//! objects and returns the first fix with usable coordinates. Sources are
//! tried one after another, never concurrently, and a failing source only
//! ever causes a fall-through to the next one. The standard chain is:
//!
//! 1. latest telemetry for the vehicle's device
//! 2. the device's last-known position
//! 3. the vehicle's last-known position
//! 4. local geolocation
//! 5. the cached last resolved position (bounded age)
//! 6. a fixed default coordinate

mod cache;
mod geolocation;
mod strategy;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

use crate::api::{with_retry, ApiError, FleetApi, RetryPolicy, VehicleRecord};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::geo;
use crate::journey::{Location, PositionSource, RoutePoint};

pub use cache::{CachedPosition, PositionCache};
pub use geolocation::{GeolocationProvider, NoGeolocation, StaticGeolocation};
pub use strategy::{
    CacheStrategy, DefaultStrategy, DeviceStrategy, GeolocationStrategy, LocationStrategy,
    TelemetryStrategy, VehicleStrategy,
};

/// Why a single source could not produce a fix.
///
/// These never leave the resolver; they only drive the fall-through.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source had nothing to offer for this vehicle.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The source answered with unusable coordinates.
    #[error("invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates {
        /// Reported latitude.
        latitude: f64,
        /// Reported longitude.
        longitude: f64,
    },

    /// The upstream call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SourceError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }
}

/// Raw coordinates and motion reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Speed in km/h.
    pub speed: f64,
    /// Heading in degrees.
    pub heading: f64,
    /// Accuracy radius in metres.
    pub accuracy: Option<f64>,
}

impl Fix {
    /// A stationary fix at a coordinate.
    #[must_use]
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            speed: 0.0,
            heading: 0.0,
            accuracy: None,
        }
    }

    /// Build a fix from optional fields, requiring both coordinates.
    pub(crate) fn from_parts(
        latitude: Option<f64>,
        longitude: Option<f64>,
        speed: Option<f64>,
        heading: Option<f64>,
        accuracy: Option<f64>,
    ) -> std::result::Result<Self, SourceError> {
        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            return Err(SourceError::unavailable("missing coordinates"));
        };
        Ok(Self {
            latitude,
            longitude,
            speed: speed.filter(|s| s.is_finite() && *s >= 0.0).unwrap_or(0.0),
            heading: heading.filter(|h| h.is_finite()).unwrap_or(0.0),
            accuracy: accuracy.filter(|a| a.is_finite()),
        })
    }

    fn validate(self) -> std::result::Result<Self, SourceError> {
        if geo::is_valid_coordinate(self.latitude, self.longitude) {
            Ok(self)
        } else {
            Err(SourceError::InvalidCoordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

/// A resolved position tagged with the source that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Speed in km/h.
    pub speed: f64,
    /// Heading in degrees.
    pub heading: f64,
    /// Accuracy radius in metres.
    pub accuracy: Option<f64>,
    /// Which source won.
    pub source: PositionSource,
}

impl Position {
    /// Tag a fix with its source.
    #[must_use]
    pub fn from_fix(fix: Fix, source: PositionSource) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            speed: fix.speed,
            heading: fix.heading,
            accuracy: fix.accuracy,
            source,
        }
    }

    /// The coordinates alone.
    #[must_use]
    pub fn location(&self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// A route point for this position observed at `timestamp`.
    #[must_use]
    pub fn into_route_point(self, timestamp: DateTime<Utc>) -> RoutePoint {
        RoutePoint {
            latitude: self.latitude,
            longitude: self.longitude,
            timestamp,
            speed: self.speed,
            heading: self.heading,
            accuracy: self.accuracy,
            source: self.source,
            distance_from_previous: 0.0,
            address: None,
        }
    }

    fn fix(&self) -> Fix {
        Fix {
            latitude: self.latitude,
            longitude: self.longitude,
            speed: self.speed,
            heading: self.heading,
            accuracy: self.accuracy,
        }
    }
}

/// Per-resolve lookups shared by the strategies.
///
/// The vehicle record and device mapping are fetched at most once per
/// `resolve` call no matter how many strategies ask for them.
#[derive(Debug)]
pub struct ResolveContext<'a> {
    api: &'a dyn FleetApi,
    retry: &'a RetryPolicy,
    vehicle_id: &'a str,
    now: DateTime<Utc>,
    vehicle: OnceCell<std::result::Result<VehicleRecord, ApiError>>,
    device_id: OnceCell<Option<String>>,
}

impl<'a> ResolveContext<'a> {
    fn new(
        api: &'a dyn FleetApi,
        retry: &'a RetryPolicy,
        vehicle_id: &'a str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            api,
            retry,
            vehicle_id,
            now,
            vehicle: OnceCell::new(),
            device_id: OnceCell::new(),
        }
    }

    /// The vehicle being resolved.
    #[must_use]
    pub fn vehicle_id(&self) -> &str {
        self.vehicle_id
    }

    /// The time this resolution started.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The upstream API.
    #[must_use]
    pub fn api(&self) -> &dyn FleetApi {
        self.api
    }

    /// The vehicle's own record.
    ///
    /// # Errors
    ///
    /// Returns the upstream failure, which is remembered for the rest of
    /// this resolution.
    pub async fn vehicle(&self) -> std::result::Result<&VehicleRecord, SourceError> {
        self.vehicle
            .get_or_init(|| self.api.vehicle(self.vehicle_id))
            .await
            .as_ref()
            .map_err(|e| SourceError::Api(e.clone()))
    }

    /// The device assigned to the vehicle.
    ///
    /// Uses the vehicle's `device_id` when present, otherwise the first
    /// device in the device list that names this vehicle.
    pub async fn device_id(&self) -> Option<&str> {
        self.device_id
            .get_or_init(|| async {
                if let Ok(vehicle) = self.vehicle().await {
                    if let Some(device_id) = vehicle.device_id.clone() {
                        return Some(device_id);
                    }
                }
                match with_retry(self.retry, "list_devices", || self.api.list_devices()).await {
                    Ok(devices) => devices
                        .into_iter()
                        .find(|d| d.vehicle_id.as_deref() == Some(self.vehicle_id))
                        .map(|d| d.id),
                    Err(e) => {
                        debug!(vehicle_id = %self.vehicle_id, error = %e, "Device list unavailable");
                        None
                    }
                }
            })
            .await
            .as_deref()
    }
}

/// Settings for the standard strategy chain.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// How old a cached position may be and still be used.
    pub cache_max_age: chrono::Duration,
    /// Coordinate used when every other source fails.
    pub default_location: Location,
    /// Retry policy for the device list lookup.
    pub retry: RetryPolicy,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            cache_max_age: chrono::Duration::seconds(300),
            default_location: Location {
                latitude: 28.6139,
                longitude: 77.2090,
            },
            retry: RetryPolicy::default(),
        }
    }
}

/// Resolves a vehicle's position through an ordered fallback chain.
#[derive(Debug)]
pub struct PositionResolver {
    api: Arc<dyn FleetApi>,
    clock: Arc<dyn Clock>,
    cache: Arc<PositionCache>,
    strategies: Vec<Box<dyn LocationStrategy>>,
    retry: RetryPolicy,
}

impl PositionResolver {
    /// Build the standard six-source chain.
    #[must_use]
    pub fn new(
        api: Arc<dyn FleetApi>,
        geolocation: Arc<dyn GeolocationProvider>,
        clock: Arc<dyn Clock>,
        settings: ResolverSettings,
    ) -> Self {
        let cache = Arc::new(PositionCache::new());
        let strategies: Vec<Box<dyn LocationStrategy>> = vec![
            Box::new(TelemetryStrategy),
            Box::new(DeviceStrategy),
            Box::new(VehicleStrategy),
            Box::new(GeolocationStrategy::new(geolocation)),
            Box::new(CacheStrategy::new(Arc::clone(&cache), settings.cache_max_age)),
            Box::new(DefaultStrategy::new(settings.default_location)),
        ];
        Self {
            api,
            clock,
            cache,
            strategies,
            retry: settings.retry,
        }
    }

    /// Build a resolver over a custom chain.
    #[must_use]
    pub fn with_strategies(
        api: Arc<dyn FleetApi>,
        clock: Arc<dyn Clock>,
        cache: Arc<PositionCache>,
        strategies: Vec<Box<dyn LocationStrategy>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            clock,
            cache,
            strategies,
            retry,
        }
    }

    /// The sources in the order they are tried.
    #[must_use]
    pub fn sources(&self) -> Vec<PositionSource> {
        self.strategies.iter().map(|s| s.source()).collect()
    }

    /// The shared last-position cache.
    #[must_use]
    pub fn cache(&self) -> &PositionCache {
        &self.cache
    }

    /// Resolve the vehicle's current position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllSourcesExhausted`] only if every source failed.
    pub async fn resolve(&self, vehicle_id: &str) -> Result<Position> {
        let now = self.clock.now();
        let ctx = ResolveContext::new(self.api.as_ref(), &self.retry, vehicle_id, now);

        for strategy in &self.strategies {
            let source = strategy.source();
            match strategy.try_resolve(&ctx).await.and_then(Fix::validate) {
                Ok(fix) => {
                    let position = Position::from_fix(fix, source);
                    if is_cacheable(source) {
                        self.cache.store(vehicle_id, position.fix(), now);
                    }
                    trace!(vehicle_id, %source, lat = position.latitude, lng = position.longitude, "Position resolved");
                    return Ok(position);
                }
                Err(e) => {
                    debug!(vehicle_id, %source, error = %e, "Position source failed");
                }
            }
        }

        warn!(vehicle_id, attempted = self.strategies.len(), "All position sources exhausted");
        Err(Error::AllSourcesExhausted {
            vehicle_id: vehicle_id.to_string(),
            attempted: self.strategies.len(),
        })
    }
}

fn is_cacheable(source: PositionSource) -> bool {
    source.is_live_api() || source == PositionSource::Geolocation
}
