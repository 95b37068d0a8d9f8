//! Summary statistics over frame populations

/// Arithmetic mean and population variance (two-pass).
///
/// Returns `(0.0, 0.0)` for an empty population.
pub fn mean_var<I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let mut count = 0usize;
    let mut sum = 0.0f64;
    for v in iter.clone() {
        sum += v;
        count += 1;
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let var = iter.map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;
    (mean, var)
}

/// Mean/variance over every cell of a frame-major matrix
pub fn matrix_mean_var(matrix: &[Vec<f64>]) -> (f64, f64) {
    mean_var(matrix.iter().flat_map(|row| row.iter().copied()))
}

/// Mean/variance of each column (band) of a frame-major matrix across frames
pub fn band_mean_var(matrix: &[Vec<f64>], n_bands: usize) -> Vec<(f64, f64)> {
    (0..n_bands)
        .map(|band| mean_var(matrix.iter().map(move |row| row[band])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_variance() {
        let (mean, var) = mean_var(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(mean, 2.5);
        // Population variance, not the n-1 sample estimate (1.6667)
        assert_eq!(var, 1.25);
    }

    #[test]
    fn test_empty_population() {
        assert_eq!(mean_var(Vec::<f64>::new()), (0.0, 0.0));
    }

    #[test]
    fn test_band_statistics() {
        let m = vec![vec![1.0, 10.0], vec![3.0, 10.0]];
        let bands = band_mean_var(&m, 2);
        assert_eq!(bands[0], (2.0, 1.0));
        assert_eq!(bands[1], (10.0, 0.0));
        assert_eq!(matrix_mean_var(&m), (6.0, 16.5));
    }
}
