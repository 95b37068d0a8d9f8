//! Genre inference service
//!
//! [`GenreService`] owns the preprocessing state, label encoding and model
//! loaded from a model directory. It is immutable after construction and
//! `Send + Sync`, so one instance can be shared behind an `Arc` by any
//! number of request handlers without locking.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::artifacts::{ArtifactError, ModelArtifacts};
use crate::audio_file::{decode_recording, Recording};
use crate::features::{
    extract_features, extract_file, ExtractionError, FeatureVector, FEATURE_FIELDS,
};
use crate::model::{Classifier, ModelError, TrainedModel};
use crate::preprocessing::{
    select_feature_columns, LabelEncoding, PreprocessError, PreprocessingState,
};
use crate::types::{has_audio_extension, DEFAULT_AUDIO_EXTENSIONS};

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Unsupported file type for {filename}; expected one of {allowed:?}")]
    UnsupportedFileType {
        filename: String,
        allowed: Vec<String>,
    },

    #[error("Failed to stage upload")]
    Upload(#[source] std::io::Error),

    #[error("Feature extraction failed")]
    Extraction(#[from] ExtractionError),

    #[error("Features do not match the trained schema")]
    SchemaMismatch(#[source] PreprocessError),

    #[error("Classifier failed")]
    Model(#[from] ModelError),

    #[error("Model predicted class {class_id} but only {n_classes} labels are known")]
    UnknownClass { class_id: usize, n_classes: usize },

    #[error("Model artifacts unusable")]
    Artifact(#[from] ArtifactError),
}

impl InferenceError {
    /// Name of the pipeline stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnsupportedFileType { .. } | Self::Upload(_) => "upload",
            Self::Extraction(_) => "extraction",
            Self::SchemaMismatch(_) => "preprocessing",
            Self::Model(_) => "classification",
            Self::UnknownClass { .. } => "label decoding",
            Self::Artifact(_) => "artifacts",
        }
    }
}

/// Predicted genre for one recording
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub source: String,
    pub genre: String,
    pub class_id: usize,
    /// Probability of the predicted class, when the model provides one
    pub confidence: Option<f64>,
}

pub type Result<T> = std::result::Result<T, InferenceError>;

/// Loaded, validated inference pipeline
#[derive(Debug)]
pub struct GenreService {
    state: PreprocessingState,
    labels: LabelEncoding,
    model: TrainedModel,
    extensions: Vec<String>,
    /// Directory for staged uploads; the system temp dir when unset
    staging_dir: Option<PathBuf>,
}

impl GenreService {
    /// Build a service, checking that the artifacts fit together
    pub fn new(artifacts: ModelArtifacts) -> Result<Self> {
        let ModelArtifacts {
            state,
            labels,
            model,
        } = artifacts;

        let (_, extractor_fields) = select_feature_columns(&FEATURE_FIELDS);
        if state.input_names != extractor_fields {
            return Err(ArtifactError::Inconsistent(format!(
                "preprocessing was fitted on {} fields that do not match the extractor's {}",
                state.input_names.len(),
                extractor_fields.len()
            ))
            .into());
        }
        if model.input_dim() != state.output_dim() {
            return Err(ArtifactError::Inconsistent(format!(
                "model expects {} inputs but preprocessing produces {}",
                model.input_dim(),
                state.output_dim()
            ))
            .into());
        }
        if model.n_classes() != labels.len() {
            return Err(ArtifactError::Inconsistent(format!(
                "model has {} classes but {} labels are stored",
                model.n_classes(),
                labels.len()
            ))
            .into());
        }

        log::info!(
            "GenreService::new: {} model, {} genres, {} input fields",
            model.family(),
            labels.len(),
            state.input_names.len()
        );

        Ok(Self {
            state,
            labels,
            model,
            extensions: DEFAULT_AUDIO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            staging_dir: None,
        })
    }

    /// Load artifacts from a model directory
    pub fn load(model_dir: &Path) -> Result<Self> {
        Self::new(ModelArtifacts::load(model_dir)?)
    }

    /// Replace the accepted file extensions
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Stage uploads in `dir` instead of the system temp dir
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    fn check_extension(&self, filename: &str) -> Result<()> {
        if has_audio_extension(Path::new(filename), &self.extensions) {
            Ok(())
        } else {
            Err(InferenceError::UnsupportedFileType {
                filename: filename.to_string(),
                allowed: self.extensions.clone(),
            })
        }
    }

    pub fn labels(&self) -> &LabelEncoding {
        &self.labels
    }

    pub fn state(&self) -> &PreprocessingState {
        &self.state
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    /// Classify an already extracted feature vector
    pub fn predict_vector(&self, vector: &FeatureVector) -> Result<Prediction> {
        let x = self
            .state
            .transform_vector(vector)
            .map_err(InferenceError::SchemaMismatch)?;

        let (class_id, confidence) = self.model.predict_with_confidence(&x)?;

        let genre = self
            .labels
            .decode(class_id)
            .map_err(|_| InferenceError::UnknownClass {
                class_id,
                n_classes: self.labels.len(),
            })?
            .to_string();

        log::debug!(
            "predict_vector: {} -> {} ({:?})",
            vector.source,
            genre,
            confidence
        );

        Ok(Prediction {
            source: vector.source.clone(),
            genre,
            class_id,
            confidence,
        })
    }

    pub fn predict_recording(&self, recording: &Recording) -> Result<Prediction> {
        self.predict_vector(&extract_features(recording)?)
    }

    /// Classify an audio file; its extension must be accepted
    pub fn predict_file(&self, path: &Path) -> Result<Prediction> {
        self.check_extension(&path.to_string_lossy())?;
        self.predict_vector(&extract_file(path)?)
    }

    /// Classify an uploaded file held in memory.
    ///
    /// The extension of `filename` must be accepted. The bytes are staged in
    /// a temporary file that is removed when this returns, on every path.
    pub fn predict_upload(&self, filename: &str, bytes: &[u8]) -> Result<Prediction> {
        self.check_extension(filename)?;
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let suffix = format!(".{}", ext);
        let mut builder = tempfile::Builder::new();
        builder.prefix("sonare-upload-").suffix(&suffix);
        // Removed when `staged` drops, on success and on every error path
        let mut staged = match &self.staging_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(InferenceError::Upload)?;
        staged.write_all(bytes).map_err(InferenceError::Upload)?;
        staged.flush().map_err(InferenceError::Upload)?;

        let mut recording = decode_recording(staged.path()).map_err(|e| rename_source(e, filename))?;
        recording.source = filename.to_string();
        self.predict_recording(&recording)
    }
}

/// Report upload failures against the client's file name, not the temp path
fn rename_source(err: ExtractionError, filename: &str) -> ExtractionError {
    let source_id = filename.to_string();
    match err {
        ExtractionError::Io { source, .. } => ExtractionError::Io { source_id, source },
        ExtractionError::UnsupportedFormat { reason, .. } => {
            ExtractionError::UnsupportedFormat { source_id, reason }
        }
        ExtractionError::Decode { reason, .. } => ExtractionError::Decode { source_id, reason },
        ExtractionError::EmptyAudio { .. } => ExtractionError::EmptyAudio { source_id },
        ExtractionError::Analysis { reason, .. } => ExtractionError::Analysis { source_id, reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{FeatureTable, TableRow};
    use crate::features::{FEATURE_FIELDS, FEATURE_WIDTH};
    use crate::model::{train_pipeline, TrainingOptions};
    use std::sync::Arc;

    const GENRES: [&str; 3] = ["blues", "classical", "metal"];

    fn synthetic_table(columns: Vec<String>) -> FeatureTable {
        let width = columns.len();
        let mut table = FeatureTable {
            columns,
            rows: Vec::new(),
        };
        for i in 0..30 {
            table.rows.push(TableRow {
                source: format!("t{}.wav", i),
                values: (0..width)
                    .map(|j| (i % 3) as f64 * 10.0 + ((i * 13 + j * 7) % 9) as f64 * 0.25)
                    .collect(),
                label: GENRES[i % 3].to_string(),
            });
        }
        table
    }

    fn service_for(table: &FeatureTable) -> GenreService {
        let p = train_pipeline(table, &TrainingOptions::default()).unwrap();
        GenreService::new(ModelArtifacts {
            state: p.state,
            labels: p.labels,
            model: p.model,
        })
        .unwrap()
    }

    fn default_service() -> GenreService {
        service_for(&synthetic_table(
            FEATURE_FIELDS.iter().map(|s| s.to_string()).collect(),
        ))
    }

    fn wav_bytes(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_service_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GenreService>();
        let service = Arc::new(default_service());
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    let v = FeatureVector {
                        source: "v".to_string(),
                        values: vec![1.0; FEATURE_WIDTH],
                    };
                    service.predict_vector(&v).unwrap().genre
                })
            })
            .collect();
        let genres: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(genres[0], genres[1]);
    }

    #[test]
    fn test_silent_thirty_seconds_end_to_end() {
        let service = default_service();
        let silence = Recording::new("silence.wav", 22050, vec![0.0; 22050 * 30]);
        let prediction = service.predict_recording(&silence).unwrap();
        assert!(GENRES.contains(&prediction.genre.as_str()));
        assert_eq!(service.labels().decode(prediction.class_id).unwrap(), prediction.genre);
        let confidence = prediction.confidence.unwrap();
        assert!((0.0..=1.0).contains(&confidence));
    }

    #[test]
    fn test_predicts_training_cluster() {
        let table = synthetic_table(FEATURE_FIELDS.iter().map(|s| s.to_string()).collect());
        let service = service_for(&table);
        let row = &table.rows[4];
        let v = FeatureVector {
            source: row.source.clone(),
            values: row.values.clone(),
        };
        let prediction = service.predict_vector(&v).unwrap();
        assert_eq!(prediction.genre, row.label);
        assert_eq!(prediction.source, "t4.wav");
    }

    #[test]
    fn test_state_fitted_on_other_fields_is_rejected_at_construction() {
        let columns: Vec<String> = FEATURE_FIELDS
            .iter()
            .filter(|f| **f != "tempo")
            .map(|s| s.to_string())
            .collect();
        let p = train_pipeline(&synthetic_table(columns), &TrainingOptions::default()).unwrap();
        let err = GenreService::new(ModelArtifacts {
            state: p.state,
            labels: p.labels,
            model: p.model,
        })
        .unwrap_err();
        assert!(matches!(err, InferenceError::Artifact(ArtifactError::Inconsistent(_))));
        assert_eq!(err.stage(), "artifacts");
    }

    #[test]
    fn test_short_vector_is_schema_mismatch() {
        let service = default_service();
        let v = FeatureVector {
            source: "x.wav".to_string(),
            values: vec![0.5; FEATURE_WIDTH - 1],
        };
        let err = service.predict_vector(&v).unwrap_err();
        assert!(matches!(err, InferenceError::SchemaMismatch(_)));
        assert_eq!(err.stage(), "preprocessing");
    }

    #[test]
    fn test_inconsistent_artifacts_rejected_at_construction() {
        let table = synthetic_table(FEATURE_FIELDS.iter().map(|s| s.to_string()).collect());
        let p = train_pipeline(&table, &TrainingOptions::default()).unwrap();
        let err = GenreService::new(ModelArtifacts {
            state: p.state,
            labels: LabelEncoding::fit(["blues", "metal"]).unwrap(),
            model: p.model,
        })
        .unwrap_err();
        assert_eq!(err.stage(), "artifacts");
    }

    #[test]
    fn test_upload_extension_is_validated() {
        let service = default_service();
        let err = service.predict_upload("song.mp3", b"ID3").unwrap_err();
        assert!(matches!(err, InferenceError::UnsupportedFileType { .. }));
        assert_eq!(err.stage(), "upload");
    }

    #[test]
    fn test_upload_wav_bytes() {
        let service = default_service();
        let samples: Vec<i16> = (0..16000).map(|i| ((i as f32 * 0.07).sin() * 9000.0) as i16).collect();
        let prediction = service
            .predict_upload("Take Five.WAV", &wav_bytes(16000, &samples))
            .unwrap();
        assert_eq!(prediction.source, "Take Five.WAV");
        assert!(GENRES.contains(&prediction.genre.as_str()));
    }

    #[test]
    fn test_predict_file_checks_extension() {
        let service = default_service();
        let err = service.predict_file(Path::new("/music/track.flac")).unwrap_err();
        assert!(matches!(err, InferenceError::UnsupportedFileType { .. }));
    }

    #[test]
    fn test_staged_upload_is_removed_on_success_and_failure() {
        let staging = tempfile::tempdir().unwrap();
        let service = default_service().with_staging_dir(staging.path());
        let staged_files = || std::fs::read_dir(staging.path()).unwrap().count();

        assert!(service.predict_upload("broken.wav", b"not a riff file").is_err());
        assert_eq!(staged_files(), 0);

        let samples: Vec<i16> = (0..16000).map(|i| ((i as f32 * 0.03).sin() * 7000.0) as i16).collect();
        assert!(service.predict_upload("ok.wav", &wav_bytes(16000, &samples)).is_ok());
        assert_eq!(staged_files(), 0);

        // Rejected before anything is staged
        assert!(service.predict_upload("song.mp3", b"ID3").is_err());
        assert_eq!(staged_files(), 0);
    }

    #[test]
    fn test_corrupt_upload_reports_client_name() {
        let service = default_service();
        let err = service.predict_upload("broken.wav", b"garbage").unwrap_err();
        assert_eq!(err.stage(), "extraction");
        match err {
            InferenceError::Extraction(e) => assert_eq!(e.source_id(), "broken.wav"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
