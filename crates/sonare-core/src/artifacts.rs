//! Model directory persistence
//!
//! A model directory holds three JSON files written together after training:
//!
//! - `preprocessing.json`: [`PreprocessingState`]
//! - `labels.json`: [`LabelEncoding`]
//! - `model.json`: [`TrainedModel`]
//!
//! Floats are serialized with exact round-trip, so a loaded state transforms
//! bit-identically to the one that was saved.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::model::TrainedModel;
use crate::preprocessing::{LabelEncoding, PreprocessingState};

pub const PREPROCESSING_FILE: &str = "preprocessing.json";
pub const LABELS_FILE: &str = "labels.json";
pub const MODEL_FILE: &str = "model.json";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to access artifact {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact {path:?}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Inconsistent artifacts: {0}")]
    Inconsistent(String),
}

/// The three artifacts a [`GenreService`](crate::inference::GenreService) needs
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub state: PreprocessingState,
    pub labels: LabelEncoding,
    pub model: TrainedModel,
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<(), ArtifactError> {
    let path = dir.join(name);
    let json = serde_json::to_vec_pretty(value).map_err(|source| ArtifactError::Json {
        path: path.clone(),
        source,
    })?;
    // Write beside the target and rename so a reader never sees half a file
    let tmp = dir.join(format!(".{}.tmp", name));
    fs::write(&tmp, json).map_err(|source| ArtifactError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, &path).map_err(|source| ArtifactError::Io { path, source })
}

fn read_json<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T, ArtifactError> {
    let path = dir.join(name);
    let bytes = fs::read(&path).map_err(|source| ArtifactError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Json { path, source })
}

impl ModelArtifacts {
    pub fn save(&self, dir: &Path) -> Result<(), ArtifactError> {
        fs::create_dir_all(dir).map_err(|source| ArtifactError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        write_json(dir, PREPROCESSING_FILE, &self.state)?;
        write_json(dir, LABELS_FILE, &self.labels)?;
        write_json(dir, MODEL_FILE, &self.model)?;
        log::info!("ModelArtifacts::save: Wrote model directory {:?}", dir);
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        log::info!("ModelArtifacts::load: Loading model directory {:?}", dir);
        Ok(Self {
            state: read_json(dir, PREPROCESSING_FILE)?,
            labels: read_json(dir, LABELS_FILE)?,
            model: read_json(dir, MODEL_FILE)?,
        })
    }
}
