//! Driving-safety and data-quality alert detection.

use serde::{Deserialize, Serialize};

use crate::journey::{Alert, AlertKind, PositionSource, RoutePoint, Severity};

/// Default speed limit in km/h.
pub const DEFAULT_SPEED_LIMIT_KMH: f64 = 60.0;

/// Default harsh-acceleration threshold in km/h per second.
pub const DEFAULT_HARSH_ACCELERATION: f64 = 8.0;

/// Default harsh-braking threshold in km/h per second.
pub const DEFAULT_HARSH_BRAKING: f64 = -10.0;

/// Speeding above this multiple of the limit is high severity.
const HIGH_SEVERITY_SPEED_FACTOR: f64 = 1.2;

/// Alert trigger thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Speed limit in km/h.
    pub speed_limit_kmh: f64,
    /// Rate above which acceleration is harsh, km/h/s.
    pub harsh_acceleration: f64,
    /// Rate below which braking is harsh, km/h/s (negative).
    pub harsh_braking: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            speed_limit_kmh: DEFAULT_SPEED_LIMIT_KMH,
            harsh_acceleration: DEFAULT_HARSH_ACCELERATION,
            harsh_braking: DEFAULT_HARSH_BRAKING,
        }
    }
}

/// Evaluates consecutive route points for alerts.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertDetector {
    thresholds: AlertThresholds,
}

impl AlertDetector {
    /// Create a detector with the given thresholds.
    #[must_use]
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    /// The thresholds in use.
    #[must_use]
    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Alerts raised by moving from `prev` to `next`.
    ///
    /// Pairs whose timestamps do not advance produce nothing. No
    /// deduplication happens across calls.
    #[must_use]
    pub fn evaluate(&self, prev: &RoutePoint, next: &RoutePoint) -> Vec<Alert> {
        #[allow(clippy::cast_precision_loss)]
        let dt_secs = (next.timestamp - prev.timestamp).num_milliseconds() as f64 / 1000.0;
        if dt_secs <= 0.0 {
            return Vec::new();
        }

        let mut alerts = Vec::new();
        let raise = |kind: AlertKind, severity: Severity| Alert {
            kind,
            timestamp: next.timestamp,
            location: next.location(),
            severity,
        };

        let limit = self.thresholds.speed_limit_kmh;
        if next.speed > limit {
            let severity = if next.speed > limit * HIGH_SEVERITY_SPEED_FACTOR {
                Severity::High
            } else {
                Severity::Medium
            };
            alerts.push(raise(
                AlertKind::Speeding {
                    speed: next.speed,
                    speed_limit: limit,
                },
                severity,
            ));
        }

        let rate = (next.speed - prev.speed) / dt_secs;
        if rate > self.thresholds.harsh_acceleration {
            alerts.push(raise(
                AlertKind::HarshAcceleration { acceleration: rate },
                Severity::Medium,
            ));
        } else if rate < self.thresholds.harsh_braking {
            alerts.push(raise(
                AlertKind::HarshBraking { acceleration: rate },
                Severity::High,
            ));
        }

        if next.source == PositionSource::Estimated {
            alerts.push(raise(
                AlertKind::DataQuality {
                    message: "position estimated by dead reckoning".to_string(),
                },
                Severity::Low,
            ));
        }

        alerts
    }
}
