//! Corpus discovery and batch planning

use std::fs;
use std::path::{Path, PathBuf};

use super::CorpusError;
use crate::types::has_audio_extension;

/// One labeled audio file found under the corpus root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    /// Full path to the audio file
    pub path: PathBuf,
    /// Genre label (name of the containing directory)
    pub label: String,
    /// File name without directories, used as the table's identity column
    pub file_name: String,
}

impl CorpusEntry {
    /// Stable key recorded in the manifest: `label/file_name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.label, self.file_name)
    }
}

/// Scan `root/<label>/<file>` for audio files.
///
/// Only immediate subdirectories are labels and only files directly inside
/// them are considered. Entries come back sorted by label, then file name,
/// so the batch plan is identical across runs.
pub fn scan_corpus<S: AsRef<str>>(
    root: &Path,
    extensions: &[S],
) -> Result<Vec<CorpusEntry>, CorpusError> {
    log::info!("scan_corpus: Scanning {:?}", root);

    let unreadable = |source: std::io::Error| CorpusError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    };

    if !root.is_dir() {
        return Err(unreadable(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not a directory",
        )));
    }

    let mut entries = Vec::new();
    for label_dir in fs::read_dir(root).map_err(unreadable)?.flatten() {
        let label_path = label_dir.path();
        if !label_path.is_dir() {
            continue;
        }
        let label = match label_path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => {
                log::warn!("scan_corpus: Skipping non UTF-8 directory {:?}", label_path);
                continue;
            }
        };

        let files = match fs::read_dir(&label_path) {
            Ok(files) => files,
            Err(e) => {
                log::warn!("scan_corpus: Cannot read {:?}: {}", label_path, e);
                continue;
            }
        };

        for file in files.flatten() {
            let path = file.path();
            if !path.is_file() || !has_audio_extension(&path, extensions) {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                log::warn!("scan_corpus: Skipping non UTF-8 file name {:?}", path);
                continue;
            };
            entries.push(CorpusEntry {
                file_name: file_name.to_string(),
                label: label.clone(),
                path,
            });
        }
    }

    entries.sort_by(|a, b| {
        a.label
            .cmp(&b.label)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });

    log::info!(
        "scan_corpus: Found {} files in {} labels",
        entries.len(),
        {
            let mut labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
            labels.dedup();
            labels.len()
        }
    );

    Ok(entries)
}

/// Split entries into consecutive batches of at most `batch_size`
pub fn plan_batches(entries: &[CorpusEntry], batch_size: usize) -> Vec<&[CorpusEntry]> {
    entries.chunks(batch_size.max(1)).collect()
}
