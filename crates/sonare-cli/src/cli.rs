//! Command-line definition

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sonare_core::model::{KnnMetric, KnnWeights};

#[derive(Parser, Debug)]
#[command(name = "sonare", version, about = "Music genre classification: extract, build, fit, predict")]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(long, global = true, env = "SONARE_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the descriptor vector of one audio file
    Extract {
        file: PathBuf,
        /// Emit JSON instead of a name/value listing
        #[arg(long)]
        json: bool,
    },

    /// Build (or resume) a feature table from ROOT/<genre>/<file>
    BuildCorpus(BuildCorpusArgs),

    /// Fit preprocessing and classifier on a feature table
    Fit(FitArgs),

    /// Score a saved model on a feature table
    Evaluate { table: PathBuf, model_dir: PathBuf },

    /// Predict the genre of one or more audio files
    Predict {
        model_dir: PathBuf,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write it to the configuration path
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args, Debug)]
pub struct BuildCorpusArgs {
    pub root: PathBuf,
    pub output: PathBuf,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub workers: Option<usize>,
    /// Discard an existing table and manifest
    #[arg(long, conflicts_with = "fail_if_exists")]
    pub overwrite: bool,
    /// Refuse to run if the output exists
    #[arg(long)]
    pub fail_if_exists: bool,
}

#[derive(Args, Debug)]
pub struct FitArgs {
    pub table: PathBuf,
    pub model_dir: PathBuf,
    /// Principal components to keep (0 disables PCA)
    #[arg(long)]
    pub pca: Option<usize>,
    #[arg(long)]
    pub k: Option<usize>,
    #[arg(long)]
    pub weights: Option<KnnWeights>,
    #[arg(long)]
    pub metric: Option<KnnMetric>,
    /// Held-out fraction for evaluation
    #[arg(long, conflicts_with = "no_holdout")]
    pub test_size: Option<f64>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Train on every row and skip evaluation
    #[arg(long)]
    pub no_holdout: bool,
}
