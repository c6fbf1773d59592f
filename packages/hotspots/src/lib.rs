#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Accident hotspot pipeline.
//!
//! The static per-segment feature table is scored by the trained model
//! ([`materializer`]), the surviving high-risk segments are held in a
//! time-to-live cache that recomputes at most once per expiry ([`cache`]),
//! and map viewports are answered from the cached dataset with
//! zoom-adaptive simplification ([`query`]).

pub mod cache;
pub mod materializer;
pub mod model;
pub mod query;
pub mod source;

use accident_risk_models::TimeFeatures;
use accident_risk_spatial::{AreaGeometry, SpatialIndex};
use geojson::JsonObject;
use serde_json::Value;

use crate::source::Cell;

/// Minimum predicted risk for a segment to be kept in the dataset.
pub const DEFAULT_MIN_RISK: f64 = 0.3;

/// One scored road/grid segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    /// Row position in the source table; used as the feature id.
    pub row: usize,
    /// Stable categorical key.
    pub grid_id: String,
    /// Static attribute columns from the source table, in table order.
    pub attributes: Vec<(String, Cell)>,
    /// Time features the segment was scored with.
    pub time: TimeFeatures,
    /// Model output.
    pub predicted_risk: f64,
    /// Segment polygon(s).
    pub geometry: AreaGeometry,
}

impl SegmentRecord {
    /// Flat property map for `GeoJSON` output: every non-geometry column.
    #[must_use]
    pub fn properties(&self) -> JsonObject {
        let mut properties = JsonObject::new();
        properties.insert("grid_id".to_string(), Value::from(self.grid_id.clone()));
        for (name, cell) in &self.attributes {
            properties.insert(name.clone(), cell.to_json());
        }
        properties.insert("hour".to_string(), Value::from(self.time.hour));
        properties.insert("weekday".to_string(), Value::from(self.time.weekday));
        properties.insert("predicted_risk".to_string(), Value::from(self.predicted_risk));
        properties
    }
}

/// A fully materialized set of high-risk segments with a spatial index.
///
/// Immutable once built. The cache hands it out behind an `Arc`.
pub struct RiskDataset {
    records: Vec<SegmentRecord>,
    index: SpatialIndex,
    time: TimeFeatures,
}

impl RiskDataset {
    /// Builds the dataset and its R-tree.
    #[must_use]
    pub fn new(records: Vec<SegmentRecord>, time: TimeFeatures) -> Self {
        let index = SpatialIndex::build(records.iter().map(|r| &r.geometry));
        Self {
            records,
            index,
            time,
        }
    }

    /// All records, in source order.
    #[must_use]
    pub fn records(&self) -> &[SegmentRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Time features this dataset was scored with.
    #[must_use]
    pub const fn time(&self) -> TimeFeatures {
        self.time
    }

    /// Records whose geometry intersects `rect` (boundary contact counts),
    /// in source order.
    pub fn intersecting<'a>(
        &'a self,
        rect: &'a geo::Rect<f64>,
    ) -> impl Iterator<Item = &'a SegmentRecord> + 'a {
        self.index
            .candidates(rect)
            .into_iter()
            .map(|position| &self.records[position])
            .filter(move |record| record.geometry.intersects_rect(rect))
    }
}

impl std::fmt::Debug for RiskDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskDataset")
            .field("records", &self.records.len())
            .field("time", &self.time)
            .finish_non_exhaustive()
    }
}
