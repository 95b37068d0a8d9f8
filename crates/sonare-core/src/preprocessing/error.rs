//! Preprocessing error types

use thiserror::Error;

/// Errors raised while fitting or applying the preprocessing transform
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// Field names or count differ from the fitted schema. Never repaired.
    #[error(
        "Feature schema mismatch: expected {} fields, found {} ({})",
        expected.len(),
        found.len(),
        first_difference(expected, found)
    )]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Cannot fit preprocessing on an empty table")]
    EmptyTable,

    #[error("Non-finite value in field {field}")]
    NonFiniteInput { field: String },

    #[error("Invalid PCA configuration: {requested} components requested, at most {max} available")]
    InvalidPca { requested: usize, max: usize },

    #[error("Unknown genre label: {0}")]
    UnknownLabel(String),

    #[error("Class id {class_id} is outside the label vocabulary of {n_classes}")]
    UnknownClass { class_id: usize, n_classes: usize },

    #[error("No labels to encode")]
    EmptyLabels,
}

/// Human readable description of where two field lists diverge
fn first_difference(expected: &[String], found: &[String]) -> String {
    for (i, (e, f)) in expected.iter().zip(found.iter()).enumerate() {
        if e != f {
            return format!("position {}: expected '{}', found '{}'", i, e, f);
        }
    }
    match expected.len().cmp(&found.len()) {
        std::cmp::Ordering::Greater => format!("missing '{}'", expected[found.len()]),
        std::cmp::Ordering::Less => format!("unexpected '{}'", found[expected.len()]),
        std::cmp::Ordering::Equal => "identical".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, PreprocessError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mismatch_message_names_the_difference() {
        let err = PreprocessError::SchemaMismatch {
            expected: names(&["tempo", "rms_mean"]),
            found: names(&["rms_mean", "tempo"]),
        };
        assert!(err.to_string().contains("position 0: expected 'tempo', found 'rms_mean'"));

        let err = PreprocessError::SchemaMismatch {
            expected: names(&["tempo", "rms_mean"]),
            found: names(&["tempo"]),
        };
        assert!(err.to_string().contains("missing 'rms_mean'"));
    }
}
