//! Produces a fresh [`RiskDataset`] from the static table and the current
//! time.

use std::sync::Arc;

use accident_risk_models::TimeFeatures;
use accident_risk_spatial::AreaGeometry;
use accident_risk_spatial::codec::{CodecError, decode_wkt};
use chrono::{DateTime, FixedOffset};

use crate::cache::DatasetLoader;
use crate::model::{CategoryEncoder, FeatureMatrix, ModelError, RiskModel};
use crate::source::{FeatureSource, FeatureTable, SourceError};
use crate::{DEFAULT_MIN_RISK, RiskDataset, SegmentRecord};

/// Columns that are outcomes or outputs rather than model inputs.
pub const NON_FEATURE_COLUMNS: &[&str] = &[
    "accident_count",
    "risk_score",
    "avg_severity",
    "total_casualties",
    "total_vehicles",
    "predicted_risk",
    "geometry",
];

/// Name of the encoded `grid_id` model input.
pub const ENCODED_GRID_ID_COLUMN: &str = "grid_id_encoded";

const HOUR_COLUMN: &str = "hour";
const WEEKDAY_COLUMN: &str = "weekday";
const PREDICTED_RISK_COLUMN: &str = "predicted_risk";

/// Errors that abort a materialization. None of them leave a partial
/// dataset behind.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    /// The source table could not be read.
    #[error("Source table error: {0}")]
    Source(#[from] SourceError),

    /// A segment's geometry could not be decoded.
    #[error("Malformed geometry for grid_id '{grid_id}': {source}")]
    MalformedGeometry {
        /// Segment key.
        grid_id: String,
        /// Decoder error.
        source: CodecError,
    },

    /// The encoder has never seen a `grid_id`.
    #[error("Unknown grid_id '{category}'")]
    UnknownCategory {
        /// The unseen key.
        category: String,
    },

    /// A model input column held a non-numeric or empty value.
    #[error("Non-numeric value in feature column '{column}' for grid_id '{grid_id}'")]
    NonNumericFeature {
        /// Segment key.
        grid_id: String,
        /// Offending column.
        column: String,
    },

    /// The model failed or returned the wrong number of scores.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// The blocking materialization task panicked or was cancelled.
    #[error("Materialization task failed: {0}")]
    Join(String),
}

/// Scores the static feature table with the trained model.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct FeatureMaterializer {
    source: Arc<dyn FeatureSource>,
    model: Arc<dyn RiskModel>,
    encoder: Arc<dyn CategoryEncoder>,
    min_risk: f64,
}

impl FeatureMaterializer {
    /// Creates a materializer with the default `0.3` risk threshold.
    #[must_use]
    pub fn new(
        source: Arc<dyn FeatureSource>,
        model: Arc<dyn RiskModel>,
        encoder: Arc<dyn CategoryEncoder>,
    ) -> Self {
        Self {
            source,
            model,
            encoder,
            min_risk: DEFAULT_MIN_RISK,
        }
    }

    /// Overrides the minimum predicted risk kept in the dataset.
    #[must_use]
    pub const fn with_min_risk(mut self, min_risk: f64) -> Self {
        self.min_risk = min_risk;
        self
    }

    /// Reads the table, scores every row in one batch, decodes geometry,
    /// and keeps rows with `predicted_risk >= min_risk`.
    ///
    /// # Errors
    ///
    /// Returns [`MaterializeError`] if any collaborator fails or any row
    /// cannot be encoded or decoded.
    pub fn materialize(&self, time: TimeFeatures) -> Result<RiskDataset, MaterializeError> {
        let table = self.source.load()?;
        let total = table.rows.len();

        let batch = self.feature_matrix(&table, time)?;
        let geometries = decode_geometries(&table)?;

        let scores = if batch.is_empty() {
            Vec::new()
        } else {
            self.model.predict(&batch)?
        };
        if scores.len() != total {
            return Err(MaterializeError::Model(ModelError::Prediction(format!(
                "model returned {} scores for {total} rows",
                scores.len()
            ))));
        }

        let static_columns: Vec<(usize, &String)> = table
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| {
                !matches!(
                    name.as_str(),
                    HOUR_COLUMN | WEEKDAY_COLUMN | PREDICTED_RISK_COLUMN
                )
            })
            .collect();

        let records: Vec<SegmentRecord> = table
            .rows
            .into_iter()
            .zip(geometries)
            .zip(scores)
            .enumerate()
            .filter(|(_, (_, score))| *score >= self.min_risk)
            .map(|(row, ((source, geometry), predicted_risk))| SegmentRecord {
                row,
                attributes: static_columns
                    .iter()
                    .map(|&(i, name)| (name.clone(), source.values[i].clone()))
                    .collect(),
                grid_id: source.grid_id,
                time,
                predicted_risk,
                geometry,
            })
            .collect();

        log::info!(
            "Materialized {} of {total} segments at or above risk {} (hour={}, weekday={})",
            records.len(),
            self.min_risk,
            time.hour,
            time.weekday
        );

        Ok(RiskDataset::new(records, time))
    }

    /// Builds the model batch: every non-outcome column in table order
    /// (time features overwritten or appended), then the encoded key.
    fn feature_matrix(
        &self,
        table: &FeatureTable,
        time: TimeFeatures,
    ) -> Result<FeatureMatrix, MaterializeError> {
        enum Slot {
            Column(usize),
            Hour,
            Weekday,
        }

        let mut columns = Vec::new();
        let mut slots = Vec::new();
        for (i, name) in table.columns.iter().enumerate() {
            if NON_FEATURE_COLUMNS.contains(&name.as_str()) {
                continue;
            }
            slots.push(match name.as_str() {
                HOUR_COLUMN => Slot::Hour,
                WEEKDAY_COLUMN => Slot::Weekday,
                _ => Slot::Column(i),
            });
            columns.push(name.clone());
        }
        if !table.columns.iter().any(|c| c == HOUR_COLUMN) {
            slots.push(Slot::Hour);
            columns.push(HOUR_COLUMN.to_string());
        }
        if !table.columns.iter().any(|c| c == WEEKDAY_COLUMN) {
            slots.push(Slot::Weekday);
            columns.push(WEEKDAY_COLUMN.to_string());
        }
        columns.push(ENCODED_GRID_ID_COLUMN.to_string());

        let mut rows = Vec::with_capacity(table.rows.len());
        for source in &table.rows {
            let mut values = Vec::with_capacity(columns.len());
            for slot in &slots {
                values.push(match slot {
                    Slot::Hour => f64::from(time.hour),
                    Slot::Weekday => f64::from(time.weekday),
                    Slot::Column(i) => source.values[*i].as_number().ok_or_else(|| {
                        MaterializeError::NonNumericFeature {
                            grid_id: source.grid_id.clone(),
                            column: table.columns[*i].clone(),
                        }
                    })?,
                });
            }

            let encoded = self.encoder.encode(&source.grid_id).map_err(|e| {
                MaterializeError::UnknownCategory {
                    category: e.category,
                }
            })?;
            #[allow(clippy::cast_precision_loss)]
            values.push(encoded as f64);

            rows.push(values);
        }

        Ok(FeatureMatrix { columns, rows })
    }
}

fn decode_geometries(table: &FeatureTable) -> Result<Vec<AreaGeometry>, MaterializeError> {
    table
        .rows
        .iter()
        .map(|row| {
            decode_wkt(&row.geometry_wkt).map_err(|source| MaterializeError::MalformedGeometry {
                grid_id: row.grid_id.clone(),
                source,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl DatasetLoader for FeatureMaterializer {
    async fn load(&self, now: DateTime<FixedOffset>) -> Result<RiskDataset, MaterializeError> {
        let materializer = self.clone();
        let time = TimeFeatures::at(&now);
        tokio::task::spawn_blocking(move || materializer.materialize(time))
            .await
            .map_err(|e| MaterializeError::Join(e.to_string()))?
    }
}
