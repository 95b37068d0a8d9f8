//! End-to-end training: feature table → preprocessing, labels, model

use ndarray::{Array2, Axis};

use super::evaluation::{evaluate, EvaluationReport};
use super::knn::{KnnClassifier, KnnConfig};
use super::split::train_test_split;
use super::{ModelError, Result, TrainedModel};
use crate::corpus::FeatureTable;
use crate::preprocessing::{LabelEncoding, PcaConfig, PreprocessingState};

#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub pca: Option<PcaConfig>,
    pub knn: KnnConfig,
    /// Held-out fraction; `None` trains on every row and skips evaluation
    pub test_size: Option<f64>,
    pub seed: u64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            pca: None,
            knn: KnnConfig::default(),
            test_size: Some(0.05),
            seed: 42,
        }
    }
}

/// Everything needed to serve predictions, plus the held-out score
#[derive(Debug, Clone)]
pub struct TrainedPipeline {
    pub state: PreprocessingState,
    pub labels: LabelEncoding,
    pub model: TrainedModel,
    pub train_rows: usize,
    pub report: Option<EvaluationReport>,
}

/// Fit preprocessing and labels on the whole table, then train on the
/// training split and score the held-out split.
pub fn train_pipeline(table: &FeatureTable, options: &TrainingOptions) -> Result<TrainedPipeline> {
    if table.is_empty() {
        return Err(ModelError::EmptyTrainingSet);
    }

    let state = PreprocessingState::fit(table, options.pca)?;
    let labels = LabelEncoding::fit(table.labels())?;
    let y = labels.encode_all(&table.labels())?;
    let x = state.fit_transform_table(table)?;

    let (train_idx, test_idx) = match options.test_size {
        Some(fraction) => {
            let split = train_test_split(table.len(), fraction, options.seed)?;
            (split.train, split.test)
        }
        None => ((0..table.len()).collect(), Vec::new()),
    };

    let select = |idx: &[usize]| -> (Array2<f64>, Vec<usize>) {
        (x.select(Axis(0), idx), idx.iter().map(|&i| y[i]).collect())
    };

    let (x_train, y_train) = select(&train_idx);
    let knn = KnnClassifier::fit(&x_train, &y_train, labels.len(), options.knn)?;
    let model = TrainedModel::Knn(knn);

    log::info!(
        "train_pipeline: {} model on {} rows, {} classes, input dim {}",
        model.family(),
        train_idx.len(),
        labels.len(),
        state.output_dim()
    );

    let report = if test_idx.is_empty() {
        None
    } else {
        let (x_test, y_test) = select(&test_idx);
        let report = evaluate(&model, &x_test, &y_test, &labels)?;
        log::info!(
            "train_pipeline: held-out accuracy {:.3} on {} rows",
            report.accuracy,
            report.samples
        );
        Some(report)
    };

    Ok(TrainedPipeline {
        state,
        labels,
        model,
        train_rows: train_idx.len(),
        report,
    })
}
