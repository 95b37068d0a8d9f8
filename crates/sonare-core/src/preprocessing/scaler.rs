//! Per-field standardization

use serde::{Deserialize, Serialize};

use crate::features::stats::mean_var;

/// Scales at or below this are treated as constant columns
const MIN_SCALE: f64 = 10.0 * f64::EPSILON;

/// Zero-mean, unit-variance scaling with population statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    /// Population standard deviation; 1.0 for constant columns
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit from row-major data with `width` columns
    pub fn fit(rows: &[Vec<f64>], width: usize) -> Self {
        let mut mean = Vec::with_capacity(width);
        let mut scale = Vec::with_capacity(width);
        for col in 0..width {
            let (m, var) = mean_var(rows.iter().map(move |row| row[col]));
            let std = var.sqrt();
            mean.push(m);
            scale.push(if std <= MIN_SCALE { 1.0 } else { std });
        }
        Self { mean, scale }
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(&v, (&m, &s))| (v - m) / s)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_std_and_constant_column() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows, 2);
        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        // Population std of [1, 3] is 1, not sqrt(2)
        assert_eq!(scaler.scale, vec![1.0, 1.0]);
        assert_eq!(scaler.transform(&[3.0, 5.0]), vec![1.0, 0.0]);
    }

    #[test]
    fn test_transformed_columns_are_standardized() {
        let rows: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64 * 3.0 + 7.0]).collect();
        let scaler = StandardScaler::fit(&rows, 1);
        let out: Vec<f64> = rows.iter().map(|r| scaler.transform(r)[0]).collect();
        let (m, v) = mean_var(out.iter().copied());
        assert!(m.abs() < 1e-12);
        assert!((v - 1.0).abs() < 1e-12);
    }
}
