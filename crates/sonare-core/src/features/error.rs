//! Extraction error types

use std::path::Path;
use thiserror::Error;

/// Why a single recording produced no feature vector.
///
/// Every variant carries the source identifier so batch orchestration can
/// report the offending file without extra bookkeeping.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to read audio file {source_id}")]
    Io {
        source_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported audio format in {source_id}: {reason}")]
    UnsupportedFormat { source_id: String, reason: String },

    #[error("Failed to decode {source_id}: {reason}")]
    Decode { source_id: String, reason: String },

    #[error("No audio samples in {source_id}")]
    EmptyAudio { source_id: String },

    #[error("Analysis failed for {source_id}: {reason}")]
    Analysis { source_id: String, reason: String },
}

impl ExtractionError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            source_id: path.display().to_string(),
            source,
        }
    }

    pub fn analysis(source_id: &str, reason: impl Into<String>) -> Self {
        Self::Analysis {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Identifier of the recording that failed
    pub fn source_id(&self) -> &str {
        match self {
            Self::Io { source_id, .. }
            | Self::UnsupportedFormat { source_id, .. }
            | Self::Decode { source_id, .. }
            | Self::EmptyAudio { source_id }
            | Self::Analysis { source_id, .. } => source_id,
        }
    }

    /// File unreadable or missing
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Content present but not decodable or not analyzable
    pub fn is_decode(&self) -> bool {
        !self.is_io()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_and_classification() {
        let err = ExtractionError::io(
            Path::new("/data/rock/rock.00001.wav"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.source_id(), "/data/rock/rock.00001.wav");
        assert!(err.is_io());

        let err = ExtractionError::EmptyAudio {
            source_id: "empty.wav".to_string(),
        };
        assert!(err.is_decode());
        assert!(err.to_string().contains("empty.wav"));
    }
}
