//! Batch orchestration with durable checkpoints

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use super::manifest::{manifest_path, BatchRecord, Manifest, ManifestWriter};
use super::scan::{plan_batches, scan_corpus, CorpusEntry};
use super::table::{is_header_only, read_header, FeatureTable, TableAppender, TableRow};
use super::{CorpusBuildConfig, CorpusError, ExistingOutput};
use crate::features::{extract_file, ExtractionError, FeatureVector};

/// Maximum number of extraction threads
const MAX_WORKERS: usize = 64;

/// A file that produced no row
#[derive(Debug, Clone)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a corpus build
#[derive(Debug, Clone, Default)]
pub struct CorpusReport {
    /// Audio files found under the root
    pub total_files: usize,
    /// Files skipped because an earlier run already processed them
    pub skipped: usize,
    /// Files attempted in this run
    pub processed: usize,
    /// Files attempted in this run that failed
    pub failed: Vec<FailedFile>,
    /// Rows appended in this run
    pub rows_written: usize,
    /// Rows in the table after this run
    pub total_rows: usize,
    /// Batches committed in this run
    pub batches_committed: usize,
    /// Batches already committed before this run
    pub resumed_batches: usize,
    /// Run stopped early at a batch boundary
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Progress updates sent from the build thread
#[derive(Debug, Clone)]
pub enum CorpusProgress {
    /// Scan finished; `pending` files still need extraction
    Started {
        total: usize,
        pending: usize,
        resumed_batches: usize,
    },
    BatchStarted {
        batch_index: usize,
        files: usize,
    },
    FileFailed {
        path: PathBuf,
        reason: String,
    },
    /// Batch rows and manifest record are durable
    BatchCommitted(BatchRecord),
    Finished(CorpusReport),
}

/// Open table and manifest according to the existing-output policy
fn prepare_output(
    config: &CorpusBuildConfig,
) -> Result<(TableAppender, ManifestWriter, Manifest), CorpusError> {
    let table_path = config.output.as_path();
    let manifest_file = manifest_path(table_path);
    let table_exists = table_path.exists();
    let manifest_exists = manifest_file.exists();

    if let Some(parent) = table_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CorpusError::io(parent, e))?;
    }

    let fresh = || -> Result<(TableAppender, ManifestWriter, Manifest), CorpusError> {
        log::info!("prepare_output: Starting new table {:?}", table_path);
        // Manifest first, so an interrupted start never leaves a table without one
        let manifest_writer = ManifestWriter::create(&manifest_file)?;
        Ok((TableAppender::create(table_path)?, manifest_writer, Manifest::default()))
    };

    match config.existing_output {
        ExistingOutput::Fail => {
            if table_exists {
                return Err(CorpusError::OutputExists(table_path.to_path_buf()));
            }
            if manifest_exists {
                return Err(CorpusError::OutputExists(manifest_file.clone()));
            }
            fresh()
        }
        ExistingOutput::Overwrite => {
            for path in [table_path, manifest_file.as_path()] {
                if path.exists() {
                    log::info!("prepare_output: Removing {:?}", path);
                    fs::remove_file(path).map_err(|e| CorpusError::io(path, e))?;
                }
            }
            fresh()
        }
        ExistingOutput::Resume => {
            if !table_exists && !manifest_exists {
                return fresh();
            }

            let manifest = Manifest::load(&manifest_file)?;
            let Some(committed) = manifest.committed_table_bytes() else {
                if table_exists && !manifest_exists && !is_header_only(table_path)? {
                    return Err(CorpusError::ManifestMismatch {
                        path: manifest_file.clone(),
                        reason: "table exists without a manifest; use overwrite".to_string(),
                    });
                }
                // Nothing was ever committed
                return fresh();
            };

            if !table_exists {
                return Err(CorpusError::ManifestMismatch {
                    path: manifest_file.clone(),
                    reason: format!("{} committed batches but the table is missing", manifest.records.len()),
                });
            }

            let expected = FeatureTable::new();
            let header = read_header(table_path)?;
            if header.iter().map(|s| s.as_str()).ne(expected.header()) {
                return Err(CorpusError::TableHeaderMismatch {
                    path: table_path.to_path_buf(),
                    reason: "header differs from the extractor schema".to_string(),
                });
            }

            let table_len = fs::metadata(table_path)
                .map_err(|e| CorpusError::io(table_path, e))?
                .len();
            if table_len < committed {
                return Err(CorpusError::ManifestMismatch {
                    path: manifest_file.clone(),
                    reason: format!(
                        "table is {} bytes but {} bytes were committed",
                        table_len, committed
                    ),
                });
            }
            if table_len > committed {
                log::warn!(
                    "prepare_output: Dropping {} uncommitted bytes from {:?}",
                    table_len - committed,
                    table_path
                );
            }

            log::info!(
                "prepare_output: Resuming {:?} after {} committed batches ({} rows)",
                table_path,
                manifest.records.len(),
                manifest.total_rows()
            );

            let table = TableAppender::reopen(table_path, committed)?;
            let writer = ManifestWriter::reopen(&manifest_file, manifest.valid_len)?;
            Ok((table, writer, manifest))
        }
    }
}

/// Build (or resume) a feature table from a labeled corpus.
///
/// This is meant to be called from a dedicated thread; extraction itself
/// runs on a rayon pool of `config.workers` threads. Cancellation is checked
/// between batches, so a cancelled run still leaves a consistent table.
///
/// # Arguments
///
/// * `config` - Corpus location, output path and batching parameters
/// * `progress` - Optional channel for progress events
/// * `cancel` - Flag checked at every batch boundary
pub fn run_corpus_build(
    config: CorpusBuildConfig,
    progress: Option<Sender<CorpusProgress>>,
    cancel: Arc<AtomicBool>,
) -> Result<CorpusReport, CorpusError> {
    let start_time = Instant::now();
    let send = |event: CorpusProgress| {
        if let Some(tx) = &progress {
            let _ = tx.send(event);
        }
    };

    let entries = scan_corpus(&config.root, &config.extensions)?;
    if entries.is_empty() {
        return Err(CorpusError::NoInputFiles {
            root: config.root.clone(),
            extensions: config.extensions.clone(),
        });
    }

    let (mut table, mut manifest_writer, manifest) = prepare_output(&config)?;

    let done = manifest.processed_keys();
    let pending: Vec<CorpusEntry> = entries
        .iter()
        .filter(|e| !done.contains(e.key().as_str()))
        .cloned()
        .collect();

    let mut report = CorpusReport {
        total_files: entries.len(),
        skipped: entries.len() - pending.len(),
        resumed_batches: manifest.records.len(),
        total_rows: manifest.total_rows(),
        ..Default::default()
    };

    log::info!(
        "run_corpus_build: {} files, {} pending, {} already processed",
        report.total_files,
        pending.len(),
        report.skipped
    );
    send(CorpusProgress::Started {
        total: report.total_files,
        pending: pending.len(),
        resumed_batches: report.resumed_batches,
    });

    let num_workers = config.workers.clamp(1, MAX_WORKERS);
    log::info!("run_corpus_build: Using {} parallel workers", num_workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .build()
        .map_err(|e| CorpusError::WorkerPool(e.to_string()))?;

    let mut batch_index = manifest.next_batch_index();
    for batch in plan_batches(&pending, config.batch_size) {
        if cancel.load(Ordering::Relaxed) {
            log::info!("run_corpus_build: Cancelled before batch {}", batch_index);
            report.cancelled = true;
            break;
        }

        send(CorpusProgress::BatchStarted {
            batch_index,
            files: batch.len(),
        });

        // Results come back in input order
        let results: Vec<Result<FeatureVector, ExtractionError>> =
            pool.install(|| batch.par_iter().map(|entry| extract_file(&entry.path)).collect());

        let mut rows = Vec::with_capacity(batch.len());
        let mut failed = Vec::new();
        for (entry, result) in batch.iter().zip(results) {
            match result {
                Ok(vector) => rows.push(TableRow::from_vector(
                    vector,
                    entry.file_name.as_str(),
                    entry.label.as_str(),
                )),
                Err(e) => {
                    log::warn!("run_corpus_build: Skipping {:?}: {}", entry.path, e);
                    failed.push(entry.key());
                    let reason = e.to_string();
                    send(CorpusProgress::FileFailed {
                        path: entry.path.clone(),
                        reason: reason.clone(),
                    });
                    report.failed.push(FailedFile {
                        path: entry.path.clone(),
                        reason,
                    });
                }
            }
        }

        // Rows first, then the record that vouches for them
        table.append(&rows)?;
        let table_bytes = table.commit()?;
        let record = BatchRecord {
            batch_index,
            processed: batch.iter().map(|e| e.key()).collect(),
            failed,
            rows_written: rows.len(),
            table_bytes,
        };
        manifest_writer.append(&record)?;

        report.processed += batch.len();
        report.rows_written += rows.len();
        report.total_rows += rows.len();
        report.batches_committed += 1;

        log::debug!(
            "run_corpus_build: Batch {} committed ({} rows, {} failed)",
            batch_index,
            record.rows_written,
            record.failed.len()
        );
        send(CorpusProgress::BatchCommitted(record));
        batch_index += 1;
    }

    report.elapsed = start_time.elapsed();

    let attempted = report.processed + report.skipped;
    if report.total_rows == 0 && attempted > 0 && !report.cancelled {
        return Err(CorpusError::NoUsableFiles { attempted });
    }

    log::info!(
        "run_corpus_build: Complete in {:.1}s - {} rows written, {} failed, {} total rows",
        report.elapsed.as_secs_f64(),
        report.rows_written,
        report.failed.len(),
        report.total_rows
    );

    send(CorpusProgress::Finished(report.clone()));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::mpsc;

    fn write_tone(path: &Path, freq: f32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..4000 {
            let t = i as f32 / 8000.0;
            writer
                .write_sample(((2.0 * std::f32::consts::PI * freq * t).sin() * 12_000.0) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    /// 2 labels x 3 decodable files + 1 corrupt file
    fn make_corpus(root: &Path) {
        for (label, base) in [("blues", 220.0), ("metal", 1760.0)] {
            for i in 0..3 {
                write_tone(
                    &root.join(label).join(format!("{}.{:05}.wav", label, i)),
                    base + i as f32 * 50.0,
                );
            }
        }
        fs::write(root.join("metal/metal.00009.wav"), b"not audio at all").unwrap();
    }

    fn config(root: &Path, output: &Path) -> CorpusBuildConfig {
        let mut config = CorpusBuildConfig::new(root, output);
        config.batch_size = 2;
        config.workers = 2;
        config
    }

    fn no_cancel() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn test_build_skips_failures_and_writes_remaining_rows() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("corpus");
        let output = dir.path().join("out/features.csv");
        make_corpus(&root);

        let (tx, rx) = mpsc::channel();
        let report = run_corpus_build(config(&root, &output), Some(tx), no_cancel()).unwrap();

        assert_eq!(report.total_files, 7);
        assert_eq!(report.processed, 7);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.rows_written, 6);
        assert_eq!(report.batches_committed, 4);

        let table = FeatureTable::read(&output).unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(table.labels(), vec!["blues", "blues", "blues", "metal", "metal", "metal"]);
        assert_eq!(table.rows[0].source, "blues.00000.wav");

        let manifest = Manifest::load(&manifest_path(&output)).unwrap();
        assert_eq!(manifest.records.len(), 4);
        assert_eq!(manifest.records[3].failed, vec!["metal/metal.00009.wav".to_string()]);

        let events: Vec<CorpusProgress> = rx.try_iter().collect();
        assert!(matches!(events.first(), Some(CorpusProgress::Started { total: 7, pending: 7, .. })));
        assert!(matches!(events.last(), Some(CorpusProgress::Finished(_))));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, CorpusProgress::FileFailed { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_resume_after_interruption_has_no_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("corpus");
        let output = dir.path().join("features.csv");
        make_corpus(&root);

        run_corpus_build(config(&root, &output), None, no_cancel()).unwrap();
        let complete = FeatureTable::read(&output).unwrap();

        // Pretend the run died after batch 1: keep two manifest lines and
        // leave a torn, uncommitted row at the end of the table
        let manifest_file = manifest_path(&output);
        let manifest = Manifest::load(&manifest_file).unwrap();
        let kept: String = fs::read_to_string(&manifest_file)
            .unwrap()
            .lines()
            .take(2)
            .map(|l| format!("{}\n", l))
            .collect();
        fs::write(&manifest_file, kept).unwrap();
        let file = fs::OpenOptions::new().write(true).open(&output).unwrap();
        file.set_len(manifest.records[1].table_bytes).unwrap();
        drop(file);
        let mut tail = fs::read(&output).unwrap();
        tail.extend_from_slice(b"metal.00001.wav,1.5,2.");
        fs::write(&output, tail).unwrap();

        let report = run_corpus_build(config(&root, &output), None, no_cancel()).unwrap();
        assert_eq!(report.skipped, 4);
        assert_eq!(report.processed, 3);
        assert_eq!(report.resumed_batches, 2);
        assert_eq!(report.total_rows, 6);

        let resumed = FeatureTable::read(&output).unwrap();
        assert_eq!(resumed, complete);

        let manifest = Manifest::load(&manifest_file).unwrap();
        let indices: Vec<usize> = manifest.records.iter().map(|r| r.batch_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_rerun_on_complete_output_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("corpus");
        let output = dir.path().join("features.csv");
        make_corpus(&root);

        run_corpus_build(config(&root, &output), None, no_cancel()).unwrap();
        let before = fs::read(&output).unwrap();
        let report = run_corpus_build(config(&root, &output), None, no_cancel()).unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.total_rows, 6);
        assert_eq!(fs::read(&output).unwrap(), before);
    }

    #[test]
    fn test_existing_output_policies() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("corpus");
        let output = dir.path().join("features.csv");
        make_corpus(&root);
        run_corpus_build(config(&root, &output), None, no_cancel()).unwrap();

        let mut fail = config(&root, &output);
        fail.existing_output = ExistingOutput::Fail;
        assert!(matches!(
            run_corpus_build(fail, None, no_cancel()),
            Err(CorpusError::OutputExists(_))
        ));

        let mut overwrite = config(&root, &output);
        overwrite.existing_output = ExistingOutput::Overwrite;
        let report = run_corpus_build(overwrite, None, no_cancel()).unwrap();
        assert_eq!(report.skipped, 0);
        assert_eq!(report.rows_written, 6);
        assert_eq!(FeatureTable::read(&output).unwrap().len(), 6);
    }

    #[test]
    fn test_foreign_table_without_manifest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("corpus");
        let output = dir.path().join("features.csv");
        make_corpus(&root);
        fs::write(&output, "filename,genre\n").unwrap();

        let err = run_corpus_build(config(&root, &output), None, no_cancel()).unwrap_err();
        assert!(matches!(err, CorpusError::ManifestMismatch { .. }));
    }

    #[test]
    fn test_header_only_table_without_manifest_resumes_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("corpus");
        let output = dir.path().join("features.csv");
        make_corpus(&root);
        drop(TableAppender::create(&output).unwrap());
        assert!(!manifest_path(&output).exists());

        let report = run_corpus_build(config(&root, &output), None, no_cancel()).unwrap();
        assert_eq!(report.skipped, 0);
        assert_eq!(report.rows_written, 6);
        assert_eq!(FeatureTable::read(&output).unwrap().len(), 6);
    }

    #[test]
    fn test_all_files_failing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("corpus");
        fs::create_dir_all(root.join("jazz")).unwrap();
        fs::write(root.join("jazz/a.wav"), b"junk").unwrap();
        fs::write(root.join("jazz/b.wav"), b"junk").unwrap();

        let err = run_corpus_build(config(&root, &dir.path().join("t.csv")), None, no_cancel())
            .unwrap_err();
        assert!(matches!(err, CorpusError::NoUsableFiles { attempted: 2 }));
    }

    #[test]
    fn test_empty_root_has_no_input_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("corpus");
        fs::create_dir_all(root.join("jazz")).unwrap();
        let err = run_corpus_build(config(&root, &dir.path().join("t.csv")), None, no_cancel())
            .unwrap_err();
        assert!(matches!(err, CorpusError::NoInputFiles { .. }));
    }

    #[test]
    fn test_cancel_before_first_batch() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("corpus");
        let output = dir.path().join("features.csv");
        make_corpus(&root);

        let report =
            run_corpus_build(config(&root, &output), None, Arc::new(AtomicBool::new(true))).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.batches_committed, 0);
        assert!(FeatureTable::read(&output).unwrap().is_empty());
    }
}
