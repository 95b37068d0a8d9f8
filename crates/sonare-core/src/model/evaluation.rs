//! Held-out evaluation: accuracy and per-class precision/recall/F1

use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{Classifier, ModelError, Result};
use crate::preprocessing::LabelEncoding;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub classes: Vec<ClassMetrics>,
    /// `confusion[true][predicted]`
    pub confusion: Vec<Vec<usize>>,
    pub samples: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Predict every row of `x` and score against `y`
pub fn evaluate<C: Classifier + ?Sized>(
    model: &C,
    x: &Array2<f64>,
    y: &[usize],
    labels: &LabelEncoding,
) -> Result<EvaluationReport> {
    if x.nrows() != y.len() {
        return Err(ModelError::LabelCountMismatch {
            rows: x.nrows(),
            labels: y.len(),
        });
    }

    let n_classes = labels.len();
    let mut confusion = vec![vec![0usize; n_classes]; n_classes];
    for (row, &truth) in x.rows().into_iter().zip(y) {
        let predicted = model.predict(&row.to_vec())?;
        if truth >= n_classes || predicted >= n_classes {
            return Err(ModelError::ClassOutOfRange {
                class_id: truth.max(predicted),
                n_classes,
            });
        }
        confusion[truth][predicted] += 1;
    }

    let correct: usize = (0..n_classes).map(|c| confusion[c][c]).sum();
    let classes = labels
        .classes
        .iter()
        .enumerate()
        .map(|(c, label)| {
            let tp = confusion[c][c];
            let predicted: usize = confusion.iter().map(|row| row[c]).sum();
            let support: usize = confusion[c].iter().sum();
            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                label: label.clone(),
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect();

    Ok(EvaluationReport {
        accuracy: ratio(correct, y.len()),
        classes,
        confusion,
        samples: y.len(),
    })
}

impl EvaluationReport {
    /// Unweighted mean of per-class F1 over classes with support
    pub fn macro_f1(&self) -> f64 {
        let present: Vec<&ClassMetrics> = self.classes.iter().filter(|c| c.support > 0).collect();
        if present.is_empty() {
            return 0.0;
        }
        present.iter().map(|c| c.f1).sum::<f64>() / present.len() as f64
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.label.len())
            .max()
            .unwrap_or(0)
            .max(12);

        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.samples
        )?;
        write!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "macro f1", "", "", self.macro_f1(), self.samples
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Predicts class 0 when the first coordinate is negative
    struct SignModel;

    impl Classifier for SignModel {
        fn input_dim(&self) -> usize {
            1
        }
        fn n_classes(&self) -> usize {
            2
        }
        fn predict(&self, x: &[f64]) -> Result<usize> {
            Ok(if x[0] < 0.0 { 0 } else { 1 })
        }
    }

    #[test]
    fn test_metrics() {
        let labels = LabelEncoding::fit(["classical", "metal"]).unwrap();
        let x = Array2::from_shape_vec((4, 1), vec![-1.0, -2.0, 3.0, -4.0]).unwrap();
        let y = vec![0, 0, 1, 1];
        let report = evaluate(&SignModel, &x, &y, &labels).unwrap();

        assert_eq!(report.accuracy, 0.75);
        assert_eq!(report.confusion, vec![vec![2, 0], vec![1, 1]]);
        let classical = &report.classes[0];
        assert!((classical.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(classical.recall, 1.0);
        assert_eq!(report.classes[1].precision, 1.0);
        assert_eq!(report.classes[1].recall, 0.5);

        let text = report.to_string();
        assert!(text.contains("classical"));
        assert!(text.contains("accuracy"));
    }
}
