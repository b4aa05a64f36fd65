//! JSON export: the journey document plus analysis metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{points_by_source, Continuity, DataReliability, GapAnalysis};
use crate::error::Result;
use crate::journey::Journey;

/// Analysis attached to a JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Tool that produced the file.
    pub generator: String,
    /// Point counts keyed by source tag.
    pub points_by_source: BTreeMap<String, usize>,
    /// Whether any point was admitted in fallback mode.
    pub fallback_mode_used: bool,
    /// Share-of-live-sources rating.
    pub data_reliability: DataReliability,
    /// Gap-based continuity rating.
    pub location_continuity: Continuity,
    /// The full gap scan.
    pub gap_analysis: GapAnalysis,
}

impl ExportMetadata {
    /// Analyse a journey.
    #[must_use]
    pub fn for_journey(journey: &Journey) -> Self {
        let gap_analysis = GapAnalysis::analyze(&journey.route_points);
        Self {
            generator: concat!("journeytrack ", env!("CARGO_PKG_VERSION")).to_string(),
            points_by_source: points_by_source(journey),
            fallback_mode_used: journey.fallback_mode_used,
            data_reliability: DataReliability::rate(journey),
            location_continuity: gap_analysis.continuity,
            gap_analysis,
        }
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    journey: &'a Journey,
    metadata: ExportMetadata,
}

pub(super) fn to_json(journey: &Journey) -> Result<Vec<u8>> {
    let doc = JsonExport {
        journey,
        metadata: ExportMetadata::for_journey(journey),
    };
    Ok(serde_json::to_vec_pretty(&doc)?)
}
