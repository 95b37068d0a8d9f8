//! Corpus building: labeled audio directory → feature table
//!
//! The corpus root holds one directory per genre:
//!
//! ```text
//! root/
//!   blues/blues.00000.wav
//!   rock/rock.00042.wav
//! ```
//!
//! Files are extracted in fixed-size batches on a bounded worker pool. After
//! each batch the orchestrating thread appends the successful rows to the CSV
//! table, syncs it, and then appends a checkpoint record to the manifest
//! next to it. An interrupted run resumes from the last committed batch.
//!
//! # Usage
//!
//! ```ignore
//! let (progress_tx, progress_rx) = std::sync::mpsc::channel();
//! let cancel = Arc::new(AtomicBool::new(false));
//!
//! let handle = std::thread::spawn(move || {
//!     run_corpus_build(config, Some(progress_tx), cancel)
//! });
//!
//! for event in progress_rx { /* update UI */ }
//! let report = handle.join().expect("corpus thread panicked")?;
//! ```

mod builder;
mod manifest;
mod scan;
mod table;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use builder::{run_corpus_build, CorpusProgress, CorpusReport, FailedFile};
pub use manifest::{manifest_path, BatchRecord, Manifest};
pub use scan::{plan_batches, scan_corpus, CorpusEntry};
pub use table::{FeatureTable, TableRow};

/// What to do when the output table already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingOutput {
    /// Continue after the last committed batch
    #[default]
    Resume,
    /// Delete the table and manifest and start over
    Overwrite,
    /// Refuse to touch existing output
    Fail,
}

/// Parameters of one corpus build
#[derive(Debug, Clone)]
pub struct CorpusBuildConfig {
    /// Directory containing one subdirectory per label
    pub root: PathBuf,
    /// CSV table to write
    pub output: PathBuf,
    /// Files per committed batch
    pub batch_size: usize,
    /// Extraction threads (clamped to 1..=64)
    pub workers: usize,
    /// Accepted file extensions, case-insensitive
    pub extensions: Vec<String>,
    pub existing_output: ExistingOutput,
}

impl CorpusBuildConfig {
    pub fn new(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output: output.into(),
            batch_size: 10,
            workers: std::thread::available_parallelism().map_or(4, |n| n.get()),
            extensions: crate::types::DEFAULT_AUDIO_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            existing_output: ExistingOutput::default(),
        }
    }
}

/// Errors that abort a corpus build or a table read
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Corpus root {path:?} is missing or unreadable")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No audio files with extensions {extensions:?} under {root:?}")]
    NoInputFiles {
        root: PathBuf,
        extensions: Vec<String>,
    },

    #[error("No usable files: all {attempted} attempted files failed extraction")]
    NoUsableFiles { attempted: usize },

    #[error("Output {0:?} already exists")]
    OutputExists(PathBuf),

    #[error("Table header mismatch in {path:?}: {reason}")]
    TableHeaderMismatch { path: PathBuf, reason: String },

    #[error("Manifest {path:?} does not match its table: {reason}")]
    ManifestMismatch { path: PathBuf, reason: String },

    #[error("Malformed row at line {line} of {path:?}: {reason}")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Failed to create worker pool: {0}")]
    WorkerPool(String),

    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path:?}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl CorpusError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}
