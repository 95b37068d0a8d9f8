//! Seeded train/test split

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{ModelError, Result};

/// Row indices for training and testing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with a seeded RNG and hold out `ceil(n * test_fraction)`.
///
/// The same `(n, test_fraction, seed)` always yields the same split. Both
/// sides are guaranteed at least one row.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<Split> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ModelError::InvalidConfig(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }
    if n < 2 {
        return Err(ModelError::InvalidConfig(format!(
            "need at least 2 rows to split, got {}",
            n
        )));
    }

    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(Split {
        train,
        test: indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_is_deterministic_and_disjoint() {
        let a = train_test_split(100, 0.05, 42).unwrap();
        let b = train_test_split(100, 0.05, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.test.len(), 5);
        assert_eq!(a.train.len(), 95);

        let mut all: Vec<usize> = a.train.iter().chain(a.test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());

        let c = train_test_split(100, 0.05, 7).unwrap();
        assert_ne!(a.test, c.test);
    }

    #[test]
    fn test_small_inputs_keep_both_sides() {
        let s = train_test_split(2, 0.05, 42).unwrap();
        assert_eq!((s.train.len(), s.test.len()), (1, 1));
        assert!(train_test_split(1, 0.5, 42).is_err());
        assert!(train_test_split(10, 1.0, 42).is_err());
    }
}
