//! Model and encoder seams.
//!
//! The trained risk model and its `grid_id` encoder are loaded once at
//! startup and shared read-only. [`LinearRiskModel`] and [`LabelEncoder`]
//! are the bundled JSON-artifact implementations.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Column-named batch of model inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    /// Feature names, one per column.
    pub columns: Vec<String>,
    /// One row of values per segment, aligned with `columns`.
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the named column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Errors from running the risk model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The model rejected the batch.
    #[error("Prediction failed: {0}")]
    Prediction(String),
}

/// The encoder has never seen a category.
#[derive(Debug, thiserror::Error)]
#[error("Unknown category '{category}'")]
pub struct UnknownCategoryError {
    /// The unseen category.
    pub category: String,
}

/// Errors from loading a model or encoder artifact.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Could not read the artifact file.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Artifact path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The artifact is not valid JSON of the expected shape.
    #[error("Invalid artifact {path}: {source}")]
    Json {
        /// Artifact path.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// A trained model scoring a whole batch at once.
pub trait RiskModel: Send + Sync {
    /// Returns one score per row of `batch`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the batch cannot be scored.
    fn predict(&self, batch: &FeatureMatrix) -> Result<Vec<f64>, ModelError>;
}

/// Maps a categorical `grid_id` to the integer id the model was trained on.
pub trait CategoryEncoder: Send + Sync {
    /// Encodes one category.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownCategoryError`] if the category was not seen during
    /// training.
    fn encode(&self, category: &str) -> Result<i64, UnknownCategoryError>;
}

fn read_artifact<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ArtifactError> {
    let text = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ArtifactError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// A linear model over named features, clamped to `[0, 1]`.
///
/// Features without a weight contribute nothing; weights for features
/// absent from the batch are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearRiskModel {
    /// Constant term.
    pub intercept: f64,
    /// Weight per feature name.
    pub weights: BTreeMap<String, f64>,
}

impl LinearRiskModel {
    /// Loads a model artifact:
    /// `{ "intercept": 0.1, "weights": { "speed_limit": 0.002 } }`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let model: Self = read_artifact(path)?;
        log::info!(
            "Loaded linear risk model with {} weights from {}",
            model.weights.len(),
            path.display()
        );
        Ok(model)
    }
}

impl RiskModel for LinearRiskModel {
    fn predict(&self, batch: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        let weights: Vec<f64> = batch
            .columns
            .iter()
            .map(|name| self.weights.get(name).copied().unwrap_or(0.0))
            .collect();

        batch
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                if row.len() != weights.len() {
                    return Err(ModelError::Prediction(format!(
                        "row {i} has {} values, expected {}",
                        row.len(),
                        weights.len()
                    )));
                }
                let score = row
                    .iter()
                    .zip(&weights)
                    .fold(self.intercept, |acc, (x, w)| x.mul_add(*w, acc));
                Ok(score.clamp(0.0, 1.0))
            })
            .collect()
    }
}

/// Category encoder with label-encoder semantics: the id of a category is
/// its position in the sorted, de-duplicated class list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

#[derive(Deserialize)]
struct LabelEncoderArtifact {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Builds an encoder from the training classes.
    #[must_use]
    pub fn new(classes: impl IntoIterator<Item = String>) -> Self {
        let mut classes: Vec<String> = classes.into_iter().collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// Loads an encoder artifact: `{ "classes": ["G1", "G2"] }`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let artifact: LabelEncoderArtifact = read_artifact(path)?;
        let encoder = Self::new(artifact.classes);
        log::info!(
            "Loaded label encoder with {} classes from {}",
            encoder.classes.len(),
            path.display()
        );
        Ok(encoder)
    }

    /// Sorted class list.
    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

impl CategoryEncoder for LabelEncoder {
    fn encode(&self, category: &str) -> Result<i64, UnknownCategoryError> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(category))
            .ok()
            .and_then(|idx| i64::try_from(idx).ok())
            .ok_or_else(|| UnknownCategoryError {
                category: category.to_string(),
            })
    }
}
