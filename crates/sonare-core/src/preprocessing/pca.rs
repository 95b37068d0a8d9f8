//! Principal component projection
//!
//! Fitted with a thin SVD of the centered data matrix (faer). Each component
//! is sign-normalized so its largest-magnitude loading is positive, which
//! makes the fitted projection independent of the SVD backend's sign choice.

use faer::Mat;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::error::{PreprocessError, Result};

/// Number of components to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcaConfig {
    pub n_components: usize,
}

/// Fitted PCA projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pca {
    /// Column means of the fitted data
    pub mean: Vec<f64>,
    /// `n_components` unit vectors of input width
    pub components: Vec<Vec<f64>>,
    pub explained_variance_ratio: Vec<f64>,
}

impl Pca {
    pub fn fit(data: &Array2<f64>, config: PcaConfig) -> Result<Self> {
        let (n, d) = data.dim();
        let max = n.min(d);
        if config.n_components == 0 || config.n_components > max {
            return Err(PreprocessError::InvalidPca {
                requested: config.n_components,
                max,
            });
        }

        let mean: Vec<f64> = (0..d)
            .map(|j| data.column(j).iter().sum::<f64>() / n as f64)
            .collect();
        let centered = Mat::from_fn(n, d, |i, j| data[[i, j]] - mean[j]);

        let svd = centered.thin_svd();
        let s = svd.s_diagonal();
        let v = svd.v();

        let dof = n.saturating_sub(1).max(1) as f64;
        let variances: Vec<f64> = (0..s.nrows()).map(|i| s.read(i).powi(2) / dof).collect();
        let total: f64 = variances.iter().sum();

        let mut components = Vec::with_capacity(config.n_components);
        let mut explained_variance_ratio = Vec::with_capacity(config.n_components);
        for k in 0..config.n_components {
            let mut component: Vec<f64> = (0..d).map(|j| v.read(j, k)).collect();

            let pivot = component
                .iter()
                .enumerate()
                .fold((0usize, 0.0f64), |best, (j, &w)| {
                    if w.abs() > best.1 {
                        (j, w.abs())
                    } else {
                        best
                    }
                })
                .0;
            if component[pivot] < 0.0 {
                component.iter_mut().for_each(|w| *w = -*w);
            }

            components.push(component);
            explained_variance_ratio.push(if total > 0.0 { variances[k] / total } else { 0.0 });
        }

        log::debug!(
            "Pca::fit: {} components over {} fields explain {:.3} of variance",
            config.n_components,
            d,
            explained_variance_ratio.iter().sum::<f64>()
        );

        Ok(Self {
            mean,
            components,
            explained_variance_ratio,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.mean.len()
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn project(&self, values: &[f64]) -> Vec<f64> {
        self.components
            .iter()
            .map(|component| {
                component
                    .iter()
                    .zip(values.iter().zip(self.mean.iter()))
                    .map(|(&w, (&x, &m))| w * (x - m))
                    .sum()
            })
            .collect()
    }
}
