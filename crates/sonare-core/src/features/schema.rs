//! Feature vector schema
//!
//! The field order below is the contract between the extractor, the feature
//! table, the fitted preprocessing state and the classifier. Consumers index
//! by position as well as by name; adding, removing or reordering a field is a
//! schema-breaking change that invalidates every persisted artifact.

use serde::{Deserialize, Serialize};

/// Identity column holding the recording's source identifier
pub const IDENTITY_FIELD: &str = "filename";

/// Duration column (seconds)
pub const DURATION_FIELD: &str = "length";

/// Ground-truth label column appended by the corpus builder
pub const LABEL_FIELD: &str = "genre";

/// Number of numeric fields in a [`FeatureVector`]
pub const FEATURE_WIDTH: usize = 58;

/// Numeric fields in extraction order (everything after `filename`)
pub const FEATURE_FIELDS: [&str; FEATURE_WIDTH] = [
    "length",
    "chroma_stft_mean",
    "chroma_stft_var",
    "rms_mean",
    "rms_var",
    "spectral_centroid_mean",
    "spectral_centroid_var",
    "spectral_bandwidth_mean",
    "spectral_bandwidth_var",
    "rolloff_mean",
    "rolloff_var",
    "zero_crossing_rate_mean",
    "zero_crossing_rate_var",
    "harmony_mean",
    "harmony_var",
    "perceptr_mean",
    "perceptr_var",
    "tempo",
    "mfcc1_mean",
    "mfcc1_var",
    "mfcc2_mean",
    "mfcc2_var",
    "mfcc3_mean",
    "mfcc3_var",
    "mfcc4_mean",
    "mfcc4_var",
    "mfcc5_mean",
    "mfcc5_var",
    "mfcc6_mean",
    "mfcc6_var",
    "mfcc7_mean",
    "mfcc7_var",
    "mfcc8_mean",
    "mfcc8_var",
    "mfcc9_mean",
    "mfcc9_var",
    "mfcc10_mean",
    "mfcc10_var",
    "mfcc11_mean",
    "mfcc11_var",
    "mfcc12_mean",
    "mfcc12_var",
    "mfcc13_mean",
    "mfcc13_var",
    "mfcc14_mean",
    "mfcc14_var",
    "mfcc15_mean",
    "mfcc15_var",
    "mfcc16_mean",
    "mfcc16_var",
    "mfcc17_mean",
    "mfcc17_var",
    "mfcc18_mean",
    "mfcc18_var",
    "mfcc19_mean",
    "mfcc19_var",
    "mfcc20_mean",
    "mfcc20_var",
];

/// Header of a feature table: identity, numeric fields, label
pub fn table_header() -> Vec<&'static str> {
    let mut header = Vec::with_capacity(FEATURE_WIDTH + 2);
    header.push(IDENTITY_FIELD);
    header.extend_from_slice(&FEATURE_FIELDS);
    header.push(LABEL_FIELD);
    header
}

/// Descriptor vector computed from one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Source identifier (file path or upload name)
    pub source: String,
    /// Numeric values aligned with [`FEATURE_FIELDS`]
    pub values: Vec<f64>,
}

impl FeatureVector {
    /// Look up a field by name
    pub fn get(&self, field: &str) -> Option<f64> {
        FEATURE_FIELDS
            .iter()
            .position(|name| *name == field)
            .and_then(|idx| self.values.get(idx).copied())
    }

    /// Field names paired with values, in schema order
    pub fn named_values(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_FIELDS.iter().copied().zip(self.values.iter().copied())
    }

    /// Duration of the source recording in seconds
    pub fn duration_secs(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_schema_width_and_uniqueness() {
        let unique: HashSet<&str> = FEATURE_FIELDS.iter().copied().collect();
        assert_eq!(unique.len(), FEATURE_WIDTH);
        assert!(!unique.contains(IDENTITY_FIELD));
        assert!(!unique.contains(LABEL_FIELD));
    }

    #[test]
    fn test_mfcc_fields_are_paired_in_band_order() {
        let mfcc: Vec<&str> = FEATURE_FIELDS
            .iter()
            .copied()
            .filter(|f| f.starts_with("mfcc"))
            .collect();
        assert_eq!(mfcc.len(), 2 * crate::types::N_MFCC);
        for band in 1..=crate::types::N_MFCC {
            assert_eq!(mfcc[2 * (band - 1)], format!("mfcc{}_mean", band));
            assert_eq!(mfcc[2 * (band - 1) + 1], format!("mfcc{}_var", band));
        }
    }

    #[test]
    fn test_table_header_layout() {
        let header = table_header();
        assert_eq!(header.len(), FEATURE_WIDTH + 2);
        assert_eq!(header[0], IDENTITY_FIELD);
        assert_eq!(header[1], DURATION_FIELD);
        assert_eq!(header[18], "tempo");
        assert_eq!(*header.last().unwrap(), LABEL_FIELD);
    }

    #[test]
    fn test_get_by_name() {
        let values: Vec<f64> = (0..FEATURE_WIDTH).map(|i| i as f64).collect();
        let fv = FeatureVector {
            source: "x.wav".to_string(),
            values,
        };
        assert_eq!(fv.get("length"), Some(0.0));
        assert_eq!(fv.get("tempo"), Some(17.0));
        assert_eq!(fv.get("mfcc20_var"), Some(57.0));
        assert_eq!(fv.get("unknown"), None);
    }
}
