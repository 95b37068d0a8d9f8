//! k-nearest-neighbours classifier

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{Classifier, ModelError, Result};

/// How neighbour votes are weighted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnnWeights {
    /// Every neighbour counts once
    #[default]
    Uniform,
    /// Neighbours count by inverse distance
    Distance,
}

/// Distance between standardized vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnnMetric {
    #[default]
    Euclidean,
    Manhattan,
}

impl FromStr for KnnWeights {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uniform" => Ok(Self::Uniform),
            "distance" => Ok(Self::Distance),
            other => Err(format!("unknown weighting '{}' (uniform, distance)", other)),
        }
    }
}

impl fmt::Display for KnnWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniform => write!(f, "uniform"),
            Self::Distance => write!(f, "distance"),
        }
    }
}

impl FromStr for KnnMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "euclidean" => Ok(Self::Euclidean),
            "manhattan" => Ok(Self::Manhattan),
            other => Err(format!("unknown metric '{}' (euclidean, manhattan)", other)),
        }
    }
}

impl fmt::Display for KnnMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Euclidean => write!(f, "euclidean"),
            Self::Manhattan => write!(f, "manhattan"),
        }
    }
}

impl KnnMetric {
    fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            Self::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnnConfig {
    pub k: usize,
    pub weights: KnnWeights,
    pub metric: KnnMetric,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            k: 5,
            weights: KnnWeights::default(),
            metric: KnnMetric::default(),
        }
    }
}

/// Stored training set plus voting rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnClassifier {
    pub config: KnnConfig,
    pub n_classes: usize,
    pub points: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

impl KnnClassifier {
    pub fn fit(x: &Array2<f64>, y: &[usize], n_classes: usize, config: KnnConfig) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if x.nrows() != y.len() {
            return Err(ModelError::LabelCountMismatch {
                rows: x.nrows(),
                labels: y.len(),
            });
        }
        if config.k == 0 {
            return Err(ModelError::InvalidConfig("k must be at least 1".to_string()));
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(ModelError::ClassOutOfRange {
                class_id: bad,
                n_classes,
            });
        }

        Ok(Self {
            config,
            n_classes,
            points: x.rows().into_iter().map(|r| r.to_vec()).collect(),
            labels: y.to_vec(),
        })
    }

    /// Weighted votes per class from the `k` nearest stored points.
    ///
    /// Neighbours are ordered by distance, then by training index, so equal
    /// distances always resolve the same way.
    fn class_votes(&self, x: &[f64]) -> Result<Vec<f64>> {
        let dim = self.input_dim();
        if x.len() != dim {
            return Err(ModelError::DimensionMismatch {
                expected: dim,
                found: x.len(),
            });
        }

        let mut neighbours: Vec<(f64, usize)> = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (self.config.metric.distance(p, x), i))
            .collect();
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        neighbours.truncate(self.config.k.min(neighbours.len()));

        let mut votes = vec![0.0f64; self.n_classes];
        match self.config.weights {
            KnnWeights::Uniform => {
                for &(_, i) in &neighbours {
                    votes[self.labels[i]] += 1.0;
                }
            }
            KnnWeights::Distance => {
                // Exact matches take all the weight
                let exact: Vec<usize> = neighbours
                    .iter()
                    .filter(|(d, _)| *d == 0.0)
                    .map(|&(_, i)| i)
                    .collect();
                if exact.is_empty() {
                    for &(d, i) in &neighbours {
                        votes[self.labels[i]] += 1.0 / d;
                    }
                } else {
                    for i in exact {
                        votes[self.labels[i]] += 1.0;
                    }
                }
            }
        }
        Ok(votes)
    }
}

impl Classifier for KnnClassifier {
    fn input_dim(&self) -> usize {
        self.points.first().map_or(0, |p| p.len())
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict(&self, x: &[f64]) -> Result<usize> {
        let votes = self.class_votes(x)?;
        Ok(argmax(&votes))
    }

    fn predict_proba(&self, x: &[f64]) -> Result<Option<Vec<f64>>> {
        Ok(normalize_votes(self.class_votes(x)?))
    }

    fn predict_with_confidence(&self, x: &[f64]) -> Result<(usize, Option<f64>)> {
        let votes = self.class_votes(x)?;
        let class_id = argmax(&votes);
        let confidence = normalize_votes(votes).map(|proba| proba[class_id]);
        Ok((class_id, confidence))
    }
}

/// Votes scaled to sum to one; `None` when there is nothing to scale
fn normalize_votes(votes: Vec<f64>) -> Option<Vec<f64>> {
    let total: f64 = votes.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    Some(votes.into_iter().map(|v| v / total).collect())
}

/// Index of the largest value; the lowest index wins ties
pub(crate) fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0usize, f64::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_clusters() -> (Array2<f64>, Vec<usize>) {
        let x = Array2::from_shape_vec(
            (6, 2),
            vec![0.0, 0.0, 0.1, 0.0, 0.0, 0.2, 5.0, 5.0, 5.1, 5.0, 5.0, 5.2],
        )
        .unwrap();
        (x, vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn test_predicts_nearest_cluster() {
        let (x, y) = two_clusters();
        let knn = KnnClassifier::fit(&x, &y, 2, KnnConfig { k: 3, ..Default::default() }).unwrap();
        assert_eq!(knn.predict(&[0.05, 0.05]).unwrap(), 0);
        assert_eq!(knn.predict(&[4.9, 5.1]).unwrap(), 1);
        let proba = knn.predict_proba(&[4.9, 5.1]).unwrap().unwrap();
        assert_eq!(proba, vec![0.0, 1.0]);
    }

    #[test]
    fn test_tie_goes_to_lowest_class() {
        let (x, y) = two_clusters();
        let knn = KnnClassifier::fit(&x, &y, 2, KnnConfig { k: 6, ..Default::default() }).unwrap();
        assert_eq!(knn.predict(&[2.5, 2.5]).unwrap(), 0);
    }

    #[test]
    fn test_distance_weighting_and_exact_match() {
        let (x, y) = two_clusters();
        let config = KnnConfig {
            k: 6,
            weights: KnnWeights::Distance,
            metric: KnnMetric::Manhattan,
        };
        let knn = KnnClassifier::fit(&x, &y, 2, config).unwrap();
        assert_eq!(knn.predict(&[4.0, 4.0]).unwrap(), 1);
        let proba = knn.predict_proba(&[5.0, 5.0]).unwrap().unwrap();
        assert_eq!(proba, vec![0.0, 1.0]);
    }

    #[test]
    fn test_confidence_matches_separate_calls() {
        let (x, y) = two_clusters();
        let config = KnnConfig {
            k: 4,
            weights: KnnWeights::Distance,
            metric: KnnMetric::Euclidean,
        };
        let knn = KnnClassifier::fit(&x, &y, 2, config).unwrap();
        for query in [[0.3, 0.1], [4.0, 4.5], [2.5, 2.5]] {
            let (class_id, confidence) = knn.predict_with_confidence(&query).unwrap();
            assert_eq!(class_id, knn.predict(&query).unwrap());
            let proba = knn.predict_proba(&query).unwrap().unwrap();
            assert_eq!(confidence, Some(proba[class_id]));
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let (x, y) = two_clusters();
        let knn = KnnClassifier::fit(&x, &y, 2, KnnConfig::default()).unwrap();
        assert!(matches!(
            knn.predict(&[1.0, 2.0, 3.0]),
            Err(ModelError::DimensionMismatch { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn test_fit_validation() {
        let (x, y) = two_clusters();
        assert!(KnnClassifier::fit(&x, &y[..3], 2, KnnConfig::default()).is_err());
        assert!(KnnClassifier::fit(&x, &y, 1, KnnConfig::default()).is_err());
        let zero_k = KnnConfig { k: 0, ..Default::default() };
        assert!(KnnClassifier::fit(&x, &y, 2, zero_k).is_err());
    }

    #[test]
    fn test_parse_options() {
        assert_eq!("Distance".parse::<KnnWeights>().unwrap(), KnnWeights::Distance);
        assert_eq!("manhattan".parse::<KnnMetric>().unwrap(), KnnMetric::Manhattan);
        assert!("cosine".parse::<KnnMetric>().is_err());
        assert_eq!(KnnMetric::Euclidean.to_string(), "euclidean");
    }
}
