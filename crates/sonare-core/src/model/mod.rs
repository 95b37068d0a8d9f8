//! Classifier artifacts, splitting and evaluation
//!
//! The pipeline only needs "standardized vector in, class id out" from a
//! model; [`Classifier`] is that seam. [`TrainedModel`] is the serializable
//! set of families this crate can train and load.

mod evaluation;
mod knn;
mod split;
mod training;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::preprocessing::PreprocessError;

pub use evaluation::{evaluate, ClassMetrics, EvaluationReport};
pub use knn::{KnnClassifier, KnnConfig, KnnMetric, KnnWeights};
pub use split::{train_test_split, Split};
pub use training::{train_pipeline, TrainedPipeline, TrainingOptions};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model expects {expected} inputs, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Cannot train on an empty set")]
    EmptyTrainingSet,

    #[error("{rows} rows but {labels} labels")]
    LabelCountMismatch { rows: usize, labels: usize },

    #[error("Class id {class_id} out of range for {n_classes} classes")]
    ClassOutOfRange { class_id: usize, n_classes: usize },

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error("Preprocessing failed")]
    Preprocess(#[from] PreprocessError),
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// A fitted classifier over preprocessed vectors
pub trait Classifier {
    /// Width of the vectors the model accepts
    fn input_dim(&self) -> usize;

    fn n_classes(&self) -> usize;

    fn predict(&self, x: &[f64]) -> Result<usize>;

    /// Class probabilities, for families that can produce them
    fn predict_proba(&self, _x: &[f64]) -> Result<Option<Vec<f64>>> {
        Ok(None)
    }

    /// Predicted class and its probability, if any.
    ///
    /// Families whose probabilities and decision come from the same scores
    /// should override this to score the input once.
    fn predict_with_confidence(&self, x: &[f64]) -> Result<(usize, Option<f64>)> {
        let class_id = self.predict(x)?;
        let confidence = self
            .predict_proba(x)?
            .and_then(|proba| proba.get(class_id).copied());
        Ok((class_id, confidence))
    }
}

/// Persisted model, tagged by family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum TrainedModel {
    Knn(KnnClassifier),
}

impl TrainedModel {
    pub fn family(&self) -> &'static str {
        match self {
            Self::Knn(_) => "knn",
        }
    }
}

impl Classifier for TrainedModel {
    fn input_dim(&self) -> usize {
        match self {
            Self::Knn(m) => m.input_dim(),
        }
    }

    fn n_classes(&self) -> usize {
        match self {
            Self::Knn(m) => m.n_classes(),
        }
    }

    fn predict(&self, x: &[f64]) -> Result<usize> {
        match self {
            Self::Knn(m) => m.predict(x),
        }
    }

    fn predict_proba(&self, x: &[f64]) -> Result<Option<Vec<f64>>> {
        match self {
            Self::Knn(m) => m.predict_proba(x),
        }
    }

    fn predict_with_confidence(&self, x: &[f64]) -> Result<(usize, Option<f64>)> {
        match self {
            Self::Knn(m) => m.predict_with_confidence(x),
        }
    }
}
