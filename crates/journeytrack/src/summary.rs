//! End-of-journey summary statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::journey::{AlertKind, Journey, PositionSource, RoutePoint};

/// Speed below which a vehicle counts as stationary, in km/h.
pub const STOP_SPEED_THRESHOLD_KMH: f64 = 5.0;

/// Minimum stationary time for a stop to be reported, in seconds.
pub const MIN_STOP_DURATION_SECS: i64 = 5 * 60;

/// A period during which the vehicle stayed (nearly) still.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// First stationary sample.
    pub start: DateTime<Utc>,
    /// When the vehicle moved again (or the last stationary sample).
    pub end: DateTime<Utc>,
    /// Length of the stop in seconds.
    pub duration_secs: i64,
    /// Where the stop began.
    pub latitude: f64,
    /// Where the stop began.
    pub longitude: f64,
}

/// Statistics computed once a journey is completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JourneySummary {
    /// Number of route points.
    pub point_count: usize,
    /// Seconds from the first to the last point.
    pub duration_secs: i64,
    /// Total distance in km.
    pub total_distance: f64,
    /// Highest speed in km/h.
    pub max_speed: f64,
    /// Mean speed in km/h.
    pub avg_speed: f64,
    /// Detected stops.
    pub stops: Vec<Stop>,
    /// Harsh acceleration plus harsh braking alerts.
    pub harsh_event_count: usize,
    /// Speeding alerts.
    pub speeding_count: usize,
    /// Share of points that were dead-reckoned, in `[0, 1]`.
    pub estimated_point_fraction: f64,
    /// Reverse-geocoded start address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_address: Option<String>,
    /// Reverse-geocoded end address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_address: Option<String>,
}

impl JourneySummary {
    /// Compute the summary for a journey's current points and alerts.
    #[must_use]
    pub fn compute(journey: &Journey) -> Self {
        let points = &journey.route_points;
        let duration_secs = match (points.first(), points.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_seconds(),
            _ => 0,
        };

        let harsh_event_count = journey
            .alerts
            .iter()
            .filter(|a| {
                matches!(
                    a.kind,
                    AlertKind::HarshAcceleration { .. } | AlertKind::HarshBraking { .. }
                )
            })
            .count();
        let speeding_count = journey
            .alerts
            .iter()
            .filter(|a| matches!(a.kind, AlertKind::Speeding { .. }))
            .count();

        let estimated = points
            .iter()
            .filter(|p| p.source == PositionSource::Estimated)
            .count();
        #[allow(clippy::cast_precision_loss)]
        let estimated_point_fraction = if points.is_empty() {
            0.0
        } else {
            estimated as f64 / points.len() as f64
        };

        Self {
            point_count: points.len(),
            duration_secs,
            total_distance: journey.total_distance,
            max_speed: journey.max_speed,
            avg_speed: journey.avg_speed,
            stops: detect_stops(points),
            harsh_event_count,
            speeding_count,
            estimated_point_fraction,
            start_address: points.first().and_then(|p| p.address.clone()),
            end_address: points.last().and_then(|p| p.address.clone()),
        }
    }
}

/// Find runs of slow points lasting at least [`MIN_STOP_DURATION_SECS`].
///
/// A run ends at the first point that is moving again; that point's timestamp
/// closes the stop.
#[must_use]
pub fn detect_stops(points: &[RoutePoint]) -> Vec<Stop> {
    let mut stops = Vec::new();
    let mut run_start: Option<&RoutePoint> = None;
    let mut run_last: Option<&RoutePoint> = None;

    for point in points {
        if point.speed < STOP_SPEED_THRESHOLD_KMH {
            if run_start.is_none() {
                run_start = Some(point);
            }
            run_last = Some(point);
        } else if let Some(start) = run_start.take() {
            push_stop(&mut stops, start, point.timestamp);
            run_last = None;
        }
    }
    if let (Some(start), Some(last)) = (run_start, run_last) {
        push_stop(&mut stops, start, last.timestamp);
    }
    stops
}

fn push_stop(stops: &mut Vec<Stop>, start: &RoutePoint, end: DateTime<Utc>) {
    let duration_secs = (end - start.timestamp).num_seconds();
    if duration_secs >= MIN_STOP_DURATION_SECS {
        stops.push(Stop {
            start: start.timestamp,
            end,
            duration_secs,
            latitude: start.latitude,
            longitude: start.longitude,
        });
    }
}
