//! Batch checkpoint manifest (`<output>.manifest.jsonl`)
//!
//! One JSON object per line, one line per committed batch. A line is only
//! written after the table rows it describes are durable, so the last
//! complete line always names a consistent table prefix. A torn final line
//! (crash mid-write) is ignored and trimmed on resume.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::CorpusError;

/// Durable record of one committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch_index: usize,
    /// Keys (`label/file_name`) of every file attempted in this batch
    pub processed: Vec<String>,
    /// Subset of `processed` that produced no row
    pub failed: Vec<String>,
    pub rows_written: usize,
    /// Table length in bytes once this batch was committed
    pub table_bytes: u64,
}

/// Manifest path paired with a table path
pub fn manifest_path(table: &Path) -> PathBuf {
    let mut name = table.as_os_str().to_owned();
    name.push(".manifest.jsonl");
    PathBuf::from(name)
}

/// Committed batches read back from disk
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub records: Vec<BatchRecord>,
    /// Byte length of the valid prefix of the manifest file
    pub valid_len: u64,
}

impl Manifest {
    /// Read the valid prefix of a manifest; a missing file is an empty manifest
    pub fn load(path: &Path) -> Result<Self, CorpusError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(CorpusError::io(path, e)),
        };

        let mut manifest = Self::default();
        let mut offset = 0usize;
        while let Some(newline) = bytes[offset..].iter().position(|&b| b == b'\n') {
            let line = &bytes[offset..offset + newline];
            match serde_json::from_slice::<BatchRecord>(line) {
                Ok(record) => manifest.records.push(record),
                Err(e) => {
                    log::warn!(
                        "Manifest::load: Ignoring invalid line at byte {} of {:?}: {}",
                        offset,
                        path,
                        e
                    );
                    break;
                }
            }
            offset += newline + 1;
        }
        manifest.valid_len = offset as u64;

        if (manifest.valid_len as usize) < bytes.len() {
            log::warn!(
                "Manifest::load: {} trailing bytes of {:?} are not a committed record",
                bytes.len() - offset,
                path
            );
        }

        Ok(manifest)
    }

    /// Every file key recorded as processed, successful or not
    pub fn processed_keys(&self) -> HashSet<&str> {
        self.records
            .iter()
            .flat_map(|r| r.processed.iter().map(|s| s.as_str()))
            .collect()
    }

    /// Table length covered by the last committed batch
    pub fn committed_table_bytes(&self) -> Option<u64> {
        self.records.last().map(|r| r.table_bytes)
    }

    pub fn total_rows(&self) -> usize {
        self.records.iter().map(|r| r.rows_written).sum()
    }

    pub fn next_batch_index(&self) -> usize {
        self.records.last().map_or(0, |r| r.batch_index + 1)
    }
}

/// Append side of the manifest, owned by the single orchestrating thread
pub(crate) struct ManifestWriter {
    path: PathBuf,
    file: File,
}

impl ManifestWriter {
    /// Start an empty manifest
    pub(crate) fn create(path: &Path) -> Result<Self, CorpusError> {
        let file = File::create(path).map_err(|e| CorpusError::io(path, e))?;
        file.sync_all().map_err(|e| CorpusError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Reopen for appending after dropping anything past `valid_len`
    pub(crate) fn reopen(path: &Path, valid_len: u64) -> Result<Self, CorpusError> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| CorpusError::io(path, e))?;
        file.set_len(valid_len).map_err(|e| CorpusError::io(path, e))?;
        file.sync_all().map_err(|e| CorpusError::io(path, e))?;
        drop(file);

        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| CorpusError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Append one record and fsync; the batch is committed once this returns
    pub(crate) fn append(&mut self, record: &BatchRecord) -> Result<(), CorpusError> {
        let mut line = serde_json::to_vec(record).map_err(|e| CorpusError::ManifestMismatch {
            path: self.path.clone(),
            reason: format!("cannot serialize batch record: {}", e),
        })?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .map_err(|e| CorpusError::io(&self.path, e))?;
        self.file
            .sync_all()
            .map_err(|e| CorpusError::io(&self.path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize, keys: &[&str], table_bytes: u64) -> BatchRecord {
        BatchRecord {
            batch_index: index,
            processed: keys.iter().map(|s| s.to_string()).collect(),
            failed: Vec::new(),
            rows_written: keys.len(),
            table_bytes,
        }
    }

    #[test]
    fn test_manifest_path_appends_suffix() {
        assert_eq!(
            manifest_path(Path::new("/out/features.csv")),
            PathBuf::from("/out/features.csv.manifest.jsonl")
        );
    }

    #[test]
    fn test_missing_manifest_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load(&dir.path().join("none.jsonl")).unwrap();
        assert!(manifest.records.is_empty());
        assert_eq!(manifest.next_batch_index(), 0);
        assert_eq!(manifest.committed_table_bytes(), None);
    }

    #[test]
    fn test_append_and_load_ignores_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.jsonl");

        let mut writer = ManifestWriter::create(&path).unwrap();
        writer.append(&record(0, &["blues/a.wav", "blues/b.wav"], 100)).unwrap();
        writer.append(&record(1, &["rock/c.wav"], 150)).unwrap();
        drop(writer);
        let committed_len = std::fs::metadata(&path).unwrap().len();

        // Simulate a crash in the middle of writing the third record
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"batch_index\":2,\"proc").unwrap();
        drop(file);

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.records.len(), 2);
        assert_eq!(manifest.valid_len, committed_len);
        assert_eq!(manifest.committed_table_bytes(), Some(150));
        assert_eq!(manifest.total_rows(), 3);
        assert_eq!(manifest.next_batch_index(), 2);
        assert!(manifest.processed_keys().contains("rock/c.wav"));

        let mut writer = ManifestWriter::reopen(&path, manifest.valid_len).unwrap();
        writer.append(&record(2, &["rock/d.wav"], 200)).unwrap();
        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.records.len(), 3);
        assert_eq!(manifest.records[2].batch_index, 2);
    }
}
