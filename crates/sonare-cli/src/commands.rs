//! Subcommand implementations

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use anyhow::{bail, Context, Result};
use serde_json::json;

use sonare_core::artifacts::ModelArtifacts;
use sonare_core::config::{save_config, Config};
use sonare_core::corpus::{run_corpus_build, CorpusProgress, ExistingOutput, FeatureTable};
use sonare_core::features::{extract_file, FEATURE_FIELDS};
use sonare_core::inference::GenreService;
use sonare_core::model::{evaluate as score, train_pipeline};
use sonare_core::preprocessing::PcaConfig;

use crate::cli::{BuildCorpusArgs, FitArgs};

pub fn extract(file: &Path, as_json: bool) -> Result<()> {
    let vector = extract_file(file).with_context(|| format!("Failed to extract {:?}", file))?;

    if as_json {
        // Parallel arrays keep schema order
        let out = json!({
            "filename": vector.source,
            "fields": &FEATURE_FIELDS[..],
            "values": vector.values,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("filename: {}", vector.source);
        let width = FEATURE_FIELDS.iter().map(|f| f.len()).max().unwrap_or(0);
        for (name, value) in vector.named_values() {
            println!("{:<width$}  {}", name, value);
        }
    }
    Ok(())
}

pub fn build_corpus(config: &Config, args: BuildCorpusArgs) -> Result<()> {
    let mut build = config.corpus_build(&args.root, &args.output);
    if let Some(batch_size) = args.batch_size {
        build.batch_size = batch_size;
    }
    if let Some(workers) = args.workers {
        build.workers = workers;
    }
    if args.overwrite {
        build.existing_output = ExistingOutput::Overwrite;
    } else if args.fail_if_exists {
        build.existing_output = ExistingOutput::Fail;
    }

    let (progress_tx, progress_rx) = mpsc::channel();
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            log::warn!("build_corpus: Interrupt received, finishing the current batch");
            cancel.store(true, Ordering::Relaxed);
        })
        .context("Failed to install interrupt handler")?;
    }

    let worker = {
        let cancel = Arc::clone(&cancel);
        std::thread::Builder::new()
            .name("corpus-build".to_string())
            .spawn(move || run_corpus_build(build, Some(progress_tx), cancel))
            .context("Failed to spawn corpus build thread")?
    };

    // Drains until the build thread drops its sender
    let mut pending = 0usize;
    let mut done = 0usize;
    for event in progress_rx {
        match event {
            CorpusProgress::Started {
                total,
                pending: p,
                resumed_batches,
            } => {
                pending = p;
                println!(
                    "{} files found, {} to process ({} batches already committed)",
                    total, p, resumed_batches
                );
            }
            CorpusProgress::BatchStarted { .. } => {}
            CorpusProgress::FileFailed { path, reason } => {
                eprintln!("  skipped {}: {}", path.display(), reason);
            }
            CorpusProgress::BatchCommitted(record) => {
                done += record.processed.len();
                println!(
                    "batch {:>4}: {} rows, {} failed  [{}/{}]",
                    record.batch_index,
                    record.rows_written,
                    record.failed.len(),
                    done,
                    pending
                );
            }
            CorpusProgress::Finished(report) => {
                println!(
                    "done in {:.1}s: {} rows written, {} failed, {} rows in {}",
                    report.elapsed.as_secs_f64(),
                    report.rows_written,
                    report.failed.len(),
                    report.total_rows,
                    args.output.display()
                );
            }
        }
    }

    let report = match worker.join() {
        Ok(result) => result.context("Corpus build failed")?,
        Err(_) => bail!("Corpus build thread panicked"),
    };
    if report.cancelled {
        log::warn!("build_corpus: Stopped early; rerun to resume");
    }
    Ok(())
}

pub fn fit(config: &Config, args: FitArgs) -> Result<()> {
    let table = FeatureTable::read(&args.table)
        .with_context(|| format!("Failed to read feature table {:?}", args.table))?;

    let mut options = config.training_options();
    if let Some(n) = args.pca {
        options.pca = (n > 0).then_some(PcaConfig { n_components: n });
    }
    if let Some(k) = args.k {
        options.knn.k = k;
    }
    if let Some(weights) = args.weights {
        options.knn.weights = weights;
    }
    if let Some(metric) = args.metric {
        options.knn.metric = metric;
    }
    if let Some(test_size) = args.test_size {
        options.test_size = Some(test_size);
    }
    if args.no_holdout {
        options.test_size = None;
    }
    if let Some(seed) = args.seed {
        options.seed = seed;
    }

    let trained = train_pipeline(&table, &options).context("Training failed")?;

    ModelArtifacts {
        state: trained.state,
        labels: trained.labels,
        model: trained.model,
    }
    .save(&args.model_dir)
    .with_context(|| format!("Failed to save model to {:?}", args.model_dir))?;

    println!(
        "trained on {} of {} rows, model saved to {}",
        trained.train_rows,
        table.len(),
        args.model_dir.display()
    );
    if let Some(report) = trained.report {
        println!();
        println!("{}", report);
    }
    Ok(())
}

pub fn evaluate(table_path: &Path, model_dir: &Path) -> Result<()> {
    let service = GenreService::load(model_dir)
        .with_context(|| format!("Failed to load model from {:?}", model_dir))?;
    let table = FeatureTable::read(table_path)
        .with_context(|| format!("Failed to read feature table {:?}", table_path))?;

    let x = service
        .state()
        .fit_transform_table(&table)
        .context("Table does not match the model's feature schema")?;
    let y = service
        .labels()
        .encode_all(&table.labels())
        .context("Table contains genres the model was not trained on")?;

    let report = score(service.model(), &x, &y, service.labels())?;
    println!("{}", report);
    Ok(())
}

pub fn predict(config: &Config, model_dir: &Path, files: &[PathBuf], as_json: bool) -> Result<()> {
    let service = GenreService::load(model_dir)
        .with_context(|| format!("Failed to load model from {:?}", model_dir))?
        .with_extensions(config.corpus.extensions.clone());

    let mut failures = 0usize;
    for file in files {
        match service.predict_file(file) {
            Ok(prediction) => {
                if as_json {
                    println!("{}", serde_json::to_string(&prediction)?);
                } else {
                    match prediction.confidence {
                        Some(p) => println!("{}: {} ({:.0}%)", file.display(), prediction.genre, p * 100.0),
                        None => println!("{}: {}", file.display(), prediction.genre),
                    }
                }
            }
            Err(e) => {
                failures += 1;
                let detail = std::error::Error::source(&e)
                    .map(|s| format!(": {}", s))
                    .unwrap_or_default();
                eprintln!("{}: {} failed: {}{}", file.display(), e.stage(), e, detail);
            }
        }
    }

    if failures == files.len() {
        bail!("No file could be classified");
    }
    Ok(())
}

pub fn show_config(config: &Config, path: &Path, write: bool) -> Result<()> {
    println!("# {}", path.display());
    print!("{}", config.to_yaml()?);
    if write {
        save_config(config, path)?;
        println!("# written");
    }
    Ok(())
}
