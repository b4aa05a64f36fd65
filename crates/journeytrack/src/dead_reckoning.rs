//! Dead-reckoning projection for when no source can produce a fix.

use chrono::{DateTime, Utc};

use crate::geo;
use crate::journey::{PositionSource, RoutePoint};
use crate::resolver::Position;

/// Default per-step speed decay applied to estimated points.
pub const DEFAULT_SPEED_DECAY: f64 = 0.95;

/// Projects a plausible position from the last admitted point.
#[derive(Debug, Clone, Copy)]
pub struct DeadReckoningEstimator {
    speed_decay: f64,
}

impl Default for DeadReckoningEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED_DECAY)
    }
}

impl DeadReckoningEstimator {
    /// Create an estimator that multiplies speed by `speed_decay` each step.
    #[must_use]
    pub fn new(speed_decay: f64) -> Self {
        Self { speed_decay }
    }

    /// The configured decay factor.
    #[must_use]
    pub fn speed_decay(&self) -> f64 {
        self.speed_decay
    }

    /// Project forward from `last` to `now`.
    ///
    /// Travels `last.speed * elapsed_hours` km along `last.heading` using the
    /// spherical destination formula. The result carries the decayed speed
    /// and the `estimated` source tag. A clock that has not moved (or moved
    /// backwards) yields the last coordinates unchanged.
    #[must_use]
    pub fn estimate(&self, last: &RoutePoint, now: DateTime<Utc>) -> Position {
        #[allow(clippy::cast_precision_loss)]
        let elapsed_hours = (now - last.timestamp).num_milliseconds().max(0) as f64 / 3_600_000.0;
        let distance_km = last.speed.max(0.0) * elapsed_hours;
        let (latitude, longitude) = if distance_km > 0.0 {
            geo::destination(last.latitude, last.longitude, last.heading, distance_km)
        } else {
            (last.latitude, last.longitude)
        };

        Position {
            latitude,
            longitude,
            speed: last.speed * self.speed_decay,
            heading: last.heading,
            accuracy: None,
            source: PositionSource::Estimated,
        }
    }
}
