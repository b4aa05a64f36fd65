//! CSV export: one row per route point.

use super::Reliability;
use crate::error::{Error, Result};
use crate::journey::{Journey, RoutePoint};

const HEADER: [&str; 10] = [
    "timestamp",
    "latitude",
    "longitude",
    "speed",
    "heading",
    "accuracy",
    "address",
    "distance_from_previous",
    "source",
    "reliability",
];

pub(super) fn to_csv(journey: &Journey) -> Result<Vec<u8>> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;
    for point in &journey.route_points {
        writer.write_record(row(point))?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::internal(format!("failed to finish CSV export: {}", e.error())))
}

fn row(point: &RoutePoint) -> [String; 10] {
    let address = point
        .address
        .clone()
        .unwrap_or_else(|| format!("{}, {}", point.latitude, point.longitude));
    [
        point.timestamp.to_rfc3339(),
        point.latitude.to_string(),
        point.longitude.to_string(),
        format!("{:.2}", point.speed),
        format!("{:.1}", point.heading),
        point.accuracy.map(|a| a.to_string()).unwrap_or_default(),
        address,
        format!("{:.6}", point.distance_from_previous),
        point.source.as_str().to_string(),
        Reliability::of(point.source).as_str().to_string(),
    ]
}
