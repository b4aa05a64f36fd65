//! The individual position sources.

use std::sync::Arc;

use chrono::Duration;

use super::{Fix, GeolocationProvider, PositionCache, ResolveContext, SourceError};
use crate::api::TelemetryEndpoint;
use crate::geo;
use crate::journey::{Location, PositionSource};

/// One named source in the resolution chain.
#[async_trait::async_trait]
pub trait LocationStrategy: Send + Sync + std::fmt::Debug {
    /// The tag attached to fixes from this source.
    fn source(&self) -> PositionSource;

    /// Try to produce a fix for the context's vehicle.
    async fn try_resolve(&self, ctx: &ResolveContext<'_>) -> Result<Fix, SourceError>;
}

/// Latest telemetry reading for the vehicle's device.
///
/// Each endpoint shape is tried in turn; the first one returning a reading
/// with usable coordinates wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryStrategy;

#[async_trait::async_trait]
impl LocationStrategy for TelemetryStrategy {
    fn source(&self) -> PositionSource {
        PositionSource::Telemetry
    }

    async fn try_resolve(&self, ctx: &ResolveContext<'_>) -> Result<Fix, SourceError> {
        let device_id = ctx
            .device_id()
            .await
            .ok_or_else(|| SourceError::unavailable("no device assigned"))?;

        let mut last_error = SourceError::unavailable("no telemetry endpoint answered");
        for endpoint in TelemetryEndpoint::ALL {
            match ctx.api().telemetry(endpoint, device_id).await {
                Ok(readings) => {
                    let fix = readings.into_iter().find_map(|r| {
                        Fix::from_parts(r.latitude, r.longitude, r.speed, r.heading, r.accuracy)
                            .ok()
                            .filter(|f| geo::is_valid_coordinate(f.latitude, f.longitude))
                    });
                    if let Some(fix) = fix {
                        return Ok(fix);
                    }
                    last_error = SourceError::unavailable(format!(
                        "{} returned no usable reading",
                        endpoint.path(device_id)
                    ));
                }
                Err(e) => last_error = e.into(),
            }
        }
        Err(last_error)
    }
}

/// The device's own last-known position.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceStrategy;

#[async_trait::async_trait]
impl LocationStrategy for DeviceStrategy {
    fn source(&self) -> PositionSource {
        PositionSource::Device
    }

    async fn try_resolve(&self, ctx: &ResolveContext<'_>) -> Result<Fix, SourceError> {
        let device_id = ctx
            .device_id()
            .await
            .ok_or_else(|| SourceError::unavailable("no device assigned"))?;
        let device = ctx.api().device(device_id).await?;
        Fix::from_parts(
            device.latitude,
            device.longitude,
            device.speed,
            device.heading,
            device.accuracy,
        )
    }
}

/// The vehicle's own last-known position.
#[derive(Debug, Clone, Copy, Default)]
pub struct VehicleStrategy;

#[async_trait::async_trait]
impl LocationStrategy for VehicleStrategy {
    fn source(&self) -> PositionSource {
        PositionSource::Vehicle
    }

    async fn try_resolve(&self, ctx: &ResolveContext<'_>) -> Result<Fix, SourceError> {
        let vehicle = ctx.vehicle().await?;
        Fix::from_parts(
            vehicle.latitude,
            vehicle.longitude,
            vehicle.speed,
            vehicle.heading,
            None,
        )
    }
}

/// The host's geolocation capability.
#[derive(Debug, Clone)]
pub struct GeolocationStrategy {
    provider: Arc<dyn GeolocationProvider>,
}

impl GeolocationStrategy {
    /// Wrap a provider.
    #[must_use]
    pub fn new(provider: Arc<dyn GeolocationProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl LocationStrategy for GeolocationStrategy {
    fn source(&self) -> PositionSource {
        PositionSource::Geolocation
    }

    async fn try_resolve(&self, _ctx: &ResolveContext<'_>) -> Result<Fix, SourceError> {
        self.provider
            .current_fix()
            .await
            .ok_or_else(|| SourceError::unavailable("geolocation unavailable"))
    }
}

/// The last live fix for this vehicle, if recent enough.
#[derive(Debug, Clone)]
pub struct CacheStrategy {
    cache: Arc<PositionCache>,
    max_age: Duration,
}

impl CacheStrategy {
    /// Read from `cache`, accepting entries up to `max_age` old.
    #[must_use]
    pub fn new(cache: Arc<PositionCache>, max_age: Duration) -> Self {
        Self { cache, max_age }
    }
}

#[async_trait::async_trait]
impl LocationStrategy for CacheStrategy {
    fn source(&self) -> PositionSource {
        PositionSource::Cache
    }

    async fn try_resolve(&self, ctx: &ResolveContext<'_>) -> Result<Fix, SourceError> {
        self.cache
            .fresh(ctx.vehicle_id(), ctx.now(), self.max_age)
            .ok_or_else(|| SourceError::unavailable("no fresh cached position"))
    }
}

/// A fixed fallback coordinate.
#[derive(Debug, Clone, Copy)]
pub struct DefaultStrategy {
    location: Location,
}

impl DefaultStrategy {
    /// Always answer with `location`.
    #[must_use]
    pub fn new(location: Location) -> Self {
        Self { location }
    }
}

#[async_trait::async_trait]
impl LocationStrategy for DefaultStrategy {
    fn source(&self) -> PositionSource {
        PositionSource::Default
    }

    async fn try_resolve(&self, _ctx: &ResolveContext<'_>) -> Result<Fix, SourceError> {
        Ok(Fix::at(self.location.latitude, self.location.longitude))
    }
}
