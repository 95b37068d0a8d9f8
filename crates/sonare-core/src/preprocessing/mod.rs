//! Preprocessing transform shared by training and serving
//!
//! A [`PreprocessingState`] is fitted once on a feature table and persisted
//! next to the model. Every vector that reaches the classifier, whether a
//! training row or a freshly extracted recording, goes through the same
//! [`PreprocessingState::transform_row`] routine, so train/serve skew can
//! only come from different input values, never from different code.
//!
//! Columns are selected by name: anything in [`NON_FEATURE_FIELDS`] is
//! dropped, everything else must match the fitted field list exactly, in
//! order.

mod error;
mod labels;
mod pca;
mod scaler;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::corpus::FeatureTable;
use crate::features::{
    FeatureVector, DURATION_FIELD, FEATURE_FIELDS, IDENTITY_FIELD, LABEL_FIELD,
};

pub use error::{PreprocessError, Result};
pub use labels::LabelEncoding;
pub use pca::{Pca, PcaConfig};
pub use scaler::StandardScaler;

/// Columns that are never model inputs: identity, duration, label
pub const NON_FEATURE_FIELDS: [&str; 3] = [IDENTITY_FIELD, DURATION_FIELD, LABEL_FIELD];

/// Indices and names of the model-input columns, in input order
pub fn select_feature_columns<S: AsRef<str>>(columns: &[S]) -> (Vec<usize>, Vec<String>) {
    columns
        .iter()
        .enumerate()
        .map(|(i, name)| (i, name.as_ref()))
        .filter(|(_, name)| !NON_FEATURE_FIELDS.iter().any(|f| f == name))
        .map(|(i, name)| (i, name.to_string()))
        .unzip()
}

/// Fitted standardization (and optional projection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingState {
    /// Ordered model-input field names
    pub input_names: Vec<String>,
    pub scaler: StandardScaler,
    pub pca: Option<Pca>,
}

impl PreprocessingState {
    /// Fit on every row of a feature table
    pub fn fit(table: &FeatureTable, pca: Option<PcaConfig>) -> Result<Self> {
        if table.is_empty() {
            return Err(PreprocessError::EmptyTable);
        }

        if let Some(row) = table.rows.iter().find(|r| r.values.len() != table.columns.len()) {
            return Err(PreprocessError::SchemaMismatch {
                expected: table.columns.clone(),
                found: (0..row.values.len()).map(|i| format!("#{}", i)).collect(),
            });
        }

        let (indices, input_names) = select_feature_columns(&table.columns);
        let rows: Vec<Vec<f64>> = table
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row.values[i]).collect())
            .collect();

        for row in &rows {
            if let Some(j) = row.iter().position(|v| !v.is_finite()) {
                return Err(PreprocessError::NonFiniteInput {
                    field: input_names[j].clone(),
                });
            }
        }

        let scaler = StandardScaler::fit(&rows, input_names.len());

        let pca = match pca {
            Some(config) => {
                let standardized =
                    Array2::from_shape_fn((rows.len(), input_names.len()), |(i, j)| {
                        (rows[i][j] - scaler.mean[j]) / scaler.scale[j]
                    });
                Some(Pca::fit(&standardized, config)?)
            }
            None => None,
        };

        log::info!(
            "PreprocessingState::fit: {} rows, {} input fields, output dim {}",
            rows.len(),
            input_names.len(),
            pca.as_ref().map_or(input_names.len(), |p| p.n_components())
        );

        Ok(Self {
            input_names,
            scaler,
            pca,
        })
    }

    /// Width of the vectors handed to the classifier
    pub fn output_dim(&self) -> usize {
        self.pca
            .as_ref()
            .map_or(self.input_names.len(), |p| p.n_components())
    }

    /// Transform values already aligned with `input_names`.
    ///
    /// This is the single transform routine; every other entry point
    /// validates names and then calls it.
    pub fn transform_row(&self, values: &[f64]) -> Result<Vec<f64>> {
        if values.len() != self.input_names.len() {
            return Err(PreprocessError::SchemaMismatch {
                expected: self.input_names.clone(),
                found: (0..values.len()).map(|i| format!("#{}", i)).collect(),
            });
        }
        if let Some(j) = values.iter().position(|v| !v.is_finite()) {
            return Err(PreprocessError::NonFiniteInput {
                field: self.input_names[j].clone(),
            });
        }

        let standardized = self.scaler.transform(values);
        Ok(match &self.pca {
            Some(pca) => pca.project(&standardized),
            None => standardized,
        })
    }

    /// Transform a named record; non-feature fields are dropped by name
    pub fn transform_named<S: AsRef<str>>(&self, names: &[S], values: &[f64]) -> Result<Vec<f64>> {
        let (indices, selected) = select_feature_columns(names);
        if names.len() != values.len() || selected != self.input_names {
            return Err(PreprocessError::SchemaMismatch {
                expected: self.input_names.clone(),
                found: selected,
            });
        }
        let row: Vec<f64> = indices.iter().map(|&i| values[i]).collect();
        self.transform_row(&row)
    }

    /// Transform an extracted feature vector
    pub fn transform_vector(&self, vector: &FeatureVector) -> Result<Vec<f64>> {
        self.transform_named(&FEATURE_FIELDS, &vector.values)
    }

    /// Transform every row of a table through the per-row routine
    pub fn fit_transform_table(&self, table: &FeatureTable) -> Result<Array2<f64>> {
        let width = self.output_dim();
        let mut out = Array2::zeros((table.len(), width));
        for (i, row) in table.rows.iter().enumerate() {
            let transformed = self.transform_named(&table.columns, &row.values)?;
            out.row_mut(i)
                .iter_mut()
                .zip(transformed)
                .for_each(|(slot, v)| *slot = v);
        }
        Ok(out)
    }
}
