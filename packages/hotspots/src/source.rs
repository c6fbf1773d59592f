//! Static per-segment feature table.
//!
//! The table is keyed by `grid_id` and carries a WKT `geometry` column plus
//! any number of attribute columns. It is re-read on every materialization.

use std::path::{Path, PathBuf};

use serde_json::Value;

/// Name of the categorical key column.
pub const GRID_ID_COLUMN: &str = "grid_id";

/// Name of the WKT geometry column.
pub const GEOMETRY_COLUMN: &str = "geometry";

/// A single attribute value from the source table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// A numeric value.
    Number(f64),
    /// Anything that does not parse as a number.
    Text(String),
    /// An empty cell.
    Missing,
}

impl Cell {
    /// Parses a raw CSV field.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::Missing;
        }
        raw.parse::<f64>()
            .map_or_else(|_| Self::Text(raw.to_string()), Self::Number)
    }

    /// Numeric value, if any.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) | Self::Missing => None,
        }
    }

    /// JSON form for feature properties. Non-finite numbers become `null`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Number(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s.clone()),
            Self::Missing => Value::Null,
        }
    }
}

/// One row of the source table.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// Categorical key.
    pub grid_id: String,
    /// Raw WKT geometry text.
    pub geometry_wkt: String,
    /// Attribute values, aligned with [`FeatureTable::columns`].
    pub values: Vec<Cell>,
}

/// The static table: attribute column names plus rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    /// Attribute columns in table order, excluding `grid_id` and `geometry`.
    pub columns: Vec<String>,
    /// Rows in table order.
    pub rows: Vec<SourceRow>,
}

/// Errors from reading the source table.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// CSV parsing error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// A required column is absent from the header row.
    #[error("Missing required column '{column}' in {path}")]
    MissingColumn {
        /// Path to the CSV file.
        path: String,
        /// The column that was expected.
        column: &'static str,
    },
}

/// Provides the static feature table.
pub trait FeatureSource: Send + Sync {
    /// Reads the full table.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the table cannot be read or is missing a
    /// required column.
    fn load(&self) -> Result<FeatureTable, SourceError>;
}

/// A [`FeatureSource`] backed by a CSV file with a header row.
#[derive(Debug, Clone)]
pub struct CsvFeatureSource {
    path: PathBuf,
}

impl CsvFeatureSource {
    /// Creates a source reading from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn csv_error(&self, source: csv::Error) -> SourceError {
        SourceError::Csv {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl FeatureSource for CsvFeatureSource {
    fn load(&self) -> Result<FeatureTable, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .from_path(&self.path)
            .map_err(|e| self.csv_error(e))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| self.csv_error(e))?
            .iter()
            .map(|h| h.trim().to_owned())
            .collect();

        let find = |column: &'static str| {
            headers
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| SourceError::MissingColumn {
                    path: self.path.display().to_string(),
                    column,
                })
        };
        let grid_idx = find(GRID_ID_COLUMN)?;
        let geometry_idx = find(GEOMETRY_COLUMN)?;

        let attribute_idx: Vec<usize> = (0..headers.len())
            .filter(|&i| i != grid_idx && i != geometry_idx)
            .collect();
        let columns: Vec<String> = attribute_idx.iter().map(|&i| headers[i].clone()).collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| self.csv_error(e))?;
            rows.push(SourceRow {
                grid_id: record.get(grid_idx).unwrap_or("").trim().to_owned(),
                geometry_wkt: record.get(geometry_idx).unwrap_or("").to_owned(),
                values: attribute_idx
                    .iter()
                    .map(|&i| Cell::parse(record.get(i).unwrap_or("")))
                    .collect(),
            });
        }

        log::debug!(
            "Read {} rows ({} attribute columns) from {}",
            rows.len(),
            columns.len(),
            self.path.display()
        );

        Ok(FeatureTable { columns, rows })
    }
}
