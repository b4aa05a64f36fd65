//! Journey export to JSON, CSV and GPX.
//!
//! Every format shares the per-point reliability tag and the gap analysis
//! defined here. Exports are produced in memory as bytes; [`write_to_dir`]
//! adds the deterministic file naming.

mod csv;
mod gpx;
mod json;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::journey::{Journey, PositionSource, RoutePoint};

pub use json::ExportMetadata;

/// Consecutive points further apart than this count as a gap.
pub const GAP_THRESHOLD_SECS: i64 = 60;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// The full journey plus analysis metadata.
    Json,
    /// One row per route point.
    Csv,
    /// GPX 1.1 track.
    Gpx,
}

impl ExportFormat {
    /// File extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Gpx => "gpx",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "gpx" => Ok(Self::Gpx),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// How trustworthy a single point's coordinates are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    /// Fresh reading from the fleet API.
    High,
    /// Local geolocation.
    Medium,
    /// A cached earlier reading.
    Low,
    /// Not a measurement at all.
    Estimated,
}

impl Reliability {
    /// The tag for a point source.
    #[must_use]
    pub fn of(source: PositionSource) -> Self {
        match source {
            PositionSource::Telemetry | PositionSource::Device | PositionSource::Vehicle => {
                Self::High
            }
            PositionSource::Geolocation => Self::Medium,
            PositionSource::Cache => Self::Low,
            PositionSource::Default | PositionSource::Estimated => Self::Estimated,
        }
    }

    /// Lowercase tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Estimated => "estimated",
        }
    }
}

/// Overall share of points that came from live API sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataReliability {
    /// At least 80 % live.
    High,
    /// At least 50 % live.
    Medium,
    /// Less than half live.
    Low,
}

impl DataReliability {
    /// Rate a journey by its live-source share.
    #[must_use]
    pub fn rate(journey: &Journey) -> Self {
        let fraction = live_fraction(&journey.route_points);
        if fraction >= 0.8 {
            Self::High
        } else if fraction >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// How continuous the recorded track is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Continuity {
    /// No gaps.
    Excellent,
    /// Gaps in at most 10 % of intervals.
    Good,
    /// Gaps in at most 25 % of intervals.
    Fair,
    /// More frequent gaps.
    Poor,
}

/// Result of scanning a journey for recording gaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapAnalysis {
    /// Number of consecutive-point intervals.
    pub intervals: usize,
    /// Intervals longer than [`GAP_THRESHOLD_SECS`].
    pub gaps: usize,
    /// The longest interval in seconds.
    pub longest_interval_secs: i64,
    /// The resulting rating.
    pub continuity: Continuity,
}

impl GapAnalysis {
    /// Scan a point sequence.
    #[must_use]
    pub fn analyze(points: &[RoutePoint]) -> Self {
        let mut gaps = 0;
        let mut longest_interval_secs = 0;
        for pair in points.windows(2) {
            let secs = (pair[1].timestamp - pair[0].timestamp).num_seconds();
            longest_interval_secs = longest_interval_secs.max(secs);
            if secs > GAP_THRESHOLD_SECS {
                gaps += 1;
            }
        }
        let intervals = points.len().saturating_sub(1);

        #[allow(clippy::cast_precision_loss)]
        let continuity = if gaps == 0 {
            Continuity::Excellent
        } else {
            let share = gaps as f64 / intervals as f64;
            if share <= 0.10 {
                Continuity::Good
            } else if share <= 0.25 {
                Continuity::Fair
            } else {
                Continuity::Poor
            }
        };

        Self {
            intervals,
            gaps,
            longest_interval_secs,
            continuity,
        }
    }
}

/// Share of points from live API sources, in `[0, 1]`.
#[must_use]
pub fn live_fraction(points: &[RoutePoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let live = points.iter().filter(|p| p.source.is_live_api()).count();
    #[allow(clippy::cast_precision_loss)]
    let fraction = live as f64 / points.len() as f64;
    fraction
}

/// Point counts by source tag, as strings for serialization.
pub(crate) fn points_by_source(journey: &Journey) -> BTreeMap<String, usize> {
    journey
        .points_by_source()
        .into_iter()
        .map(|(source, count)| (source.as_str().to_string(), count))
        .collect()
}

/// Serialize a journey in the requested format.
///
/// # Errors
///
/// Returns [`Error::EmptyJourney`] if the journey has no points, or a
/// serialization error from the chosen format.
pub fn export(journey: &Journey, format: ExportFormat) -> Result<Vec<u8>> {
    if journey.route_points.is_empty() {
        return Err(Error::EmptyJourney {
            journey_id: journey.journey_id.clone(),
        });
    }
    match format {
        ExportFormat::Json => json::to_json(journey),
        ExportFormat::Csv => csv::to_csv(journey),
        ExportFormat::Gpx => gpx::to_gpx(journey),
    }
}

/// Serialize a journey given a format name.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for an unknown name, otherwise as
/// [`export`].
pub fn export_named(journey: &Journey, format: &str) -> Result<Vec<u8>> {
    export(journey, format.parse()?)
}

/// `journey_<label>_<start>.<ext>` with the label sanitized and `:` in the
/// start timestamp replaced by `-`.
#[must_use]
pub fn file_name(journey: &Journey, format: ExportFormat) -> String {
    let label = sanitize_label(journey.vehicle_label());
    let start = journey
        .start_time
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        .replace(':', "-");
    format!("journey_{label}_{start}.{}", format.extension())
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "vehicle".to_string()
    } else {
        cleaned
    }
}

/// Export a journey into `dir`, creating it if needed.
///
/// # Errors
///
/// Returns an error if the export fails or the file cannot be written.
pub fn write_to_dir(journey: &Journey, format: ExportFormat, dir: &Path) -> Result<PathBuf> {
    let bytes = export(journey, format)?;
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|source| Error::DirectoryCreate {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let path = dir.join(file_name(journey, format));
    std::fs::write(&path, &bytes)?;
    info!(
        journey_id = %journey.journey_id,
        %format,
        path = %path.display(),
        bytes = bytes.len(),
        "Journey exported"
    );
    Ok(path)
}


#[cfg(test)]
mod tests {
    use super::test_support::three_point_journey;
    use super::*;
    use crate::journey::test_support::point;
    use crate::journey::VehicleInfo;

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!(" gpx ".parse::<ExportFormat>().unwrap(), ExportFormat::Gpx);
        let err = "kml".parse::<ExportFormat>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ref f) if f == "kml"));
    }

    #[test]
    fn test_reliability_tags() {
        assert_eq!(Reliability::of(PositionSource::Telemetry), Reliability::High);
        assert_eq!(Reliability::of(PositionSource::Vehicle), Reliability::High);
        assert_eq!(Reliability::of(PositionSource::Geolocation), Reliability::Medium);
        assert_eq!(Reliability::of(PositionSource::Cache), Reliability::Low);
        assert_eq!(Reliability::of(PositionSource::Default), Reliability::Estimated);
        assert_eq!(Reliability::of(PositionSource::Estimated), Reliability::Estimated);
    }

    #[test]
    fn test_empty_journey_rejected() {
        let mut journey = three_point_journey();
        journey.route_points.clear();
        for format in [ExportFormat::Json, ExportFormat::Csv, ExportFormat::Gpx] {
            let err = export(&journey, format).unwrap_err();
            assert!(matches!(err, Error::EmptyJourney { .. }));
        }
    }

    #[test]
    fn test_export_named_unknown_format() {
        let err = export_named(&three_point_journey(), "kml").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_file_name() {
        let journey = three_point_journey();
        assert_eq!(
            file_name(&journey, ExportFormat::Gpx),
            "journey_Delivery_Van_2024-03-01T08-00-00Z.gpx"
        );

        let bare = Journey::begin(VehicleInfo::bare("truck/7"), point(1.0, 2.0, 0, 0.0));
        assert_eq!(
            file_name(&bare, ExportFormat::Csv),
            "journey_truck_7_2024-03-01T08-00-00Z.csv"
        );
    }

    #[test]
    fn test_gap_analysis_ratings() {
        let dense: Vec<_> = (0..5).map(|i| point(28.6, 77.2, i * 10, 20.0)).collect();
        assert_eq!(GapAnalysis::analyze(&dense).continuity, Continuity::Excellent);

        // 1 gap in 10 intervals
        let mut good: Vec<_> = (0..10).map(|i| point(28.6, 77.2, i * 10, 20.0)).collect();
        good.push(point(28.6, 77.2, 90 + 61, 20.0));
        let analysis = GapAnalysis::analyze(&good);
        assert_eq!(analysis.gaps, 1);
        assert_eq!(analysis.intervals, 10);
        assert_eq!(analysis.continuity, Continuity::Good);
        assert_eq!(analysis.longest_interval_secs, 61);

        // 1 gap in 4 intervals
        let fair = vec![
            point(28.6, 77.2, 0, 0.0),
            point(28.6, 77.2, 10, 0.0),
            point(28.6, 77.2, 20, 0.0),
            point(28.6, 77.2, 30, 0.0),
            point(28.6, 77.2, 200, 0.0),
        ];
        assert_eq!(GapAnalysis::analyze(&fair).continuity, Continuity::Fair);

        let poor = vec![
            point(28.6, 77.2, 0, 0.0),
            point(28.6, 77.2, 120, 0.0),
            point(28.6, 77.2, 130, 0.0),
        ];
        assert_eq!(GapAnalysis::analyze(&poor).continuity, Continuity::Poor);
    }

    #[test]
    fn test_exactly_sixty_seconds_is_not_a_gap() {
        let points = vec![point(28.6, 77.2, 0, 0.0), point(28.6, 77.2, 60, 0.0)];
        assert_eq!(GapAnalysis::analyze(&points).gaps, 0);
    }

    #[test]
    fn test_data_reliability() {
        let journey = three_point_journey();
        // 2 of 3 live
        assert_eq!(DataReliability::rate(&journey), DataReliability::Medium);

        let mut all_live = Journey::begin(VehicleInfo::bare("v"), point(28.6, 77.2, 0, 0.0));
        all_live.append_point(point(28.61, 77.2, 10, 10.0));
        assert_eq!(DataReliability::rate(&all_live), DataReliability::High);

        let mut mostly_estimated = all_live.clone();
        for i in 2..6 {
            let mut p = point(28.62, 77.2, i * 10, 10.0);
            p.source = PositionSource::Estimated;
            mostly_estimated.append_point(p);
        }
        assert_eq!(DataReliability::rate(&mostly_estimated), DataReliability::Low);
    }

    #[test]
    fn test_write_to_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("exports");
        let journey = three_point_journey();

        let path = write_to_dir(&journey, ExportFormat::Csv, &out).unwrap();
        assert!(path.starts_with(&out));
        assert!(path.exists());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 4);
    }
}
