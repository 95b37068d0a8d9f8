//! Genre label ↔ class id mapping

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::error::{PreprocessError, Result};

/// Sorted unique genre names; a label's class id is its index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoding {
    pub classes: Vec<String>,
}

impl LabelEncoding {
    pub fn fit<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes: BTreeSet<String> = labels.into_iter().map(|s| s.as_ref().to_string()).collect();
        if classes.is_empty() {
            return Err(PreprocessError::EmptyLabels);
        }
        Ok(Self {
            classes: classes.into_iter().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn encode(&self, label: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| PreprocessError::UnknownLabel(label.to_string()))
    }

    pub fn encode_all<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    pub fn decode(&self, class_id: usize) -> Result<&str> {
        self.classes
            .get(class_id)
            .map(|s| s.as_str())
            .ok_or(PreprocessError::UnknownClass {
                class_id,
                n_classes: self.classes.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_unique_classes() {
        let enc = LabelEncoding::fit(["rock", "blues", "rock", "jazz"]).unwrap();
        assert_eq!(enc.classes, vec!["blues", "jazz", "rock"]);
        assert_eq!(enc.encode("jazz").unwrap(), 1);
        assert_eq!(enc.decode(2).unwrap(), "rock");
        assert_eq!(enc.encode_all(&["rock", "blues"]).unwrap(), vec![2, 0]);
    }

    #[test]
    fn test_unknown_label_and_class() {
        let enc = LabelEncoding::fit(["pop"]).unwrap();
        assert!(matches!(enc.encode("disco"), Err(PreprocessError::UnknownLabel(_))));
        assert!(matches!(
            enc.decode(3),
            Err(PreprocessError::UnknownClass { class_id: 3, n_classes: 1 })
        ));
        assert!(matches!(
            LabelEncoding::fit(Vec::<String>::new()),
            Err(PreprocessError::EmptyLabels)
        ));
    }
}
