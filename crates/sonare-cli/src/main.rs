//! sonare - command-line front end for the genre classification pipeline
//!
//! ## Subcommands
//!
//! - `extract`: descriptor vector of one file
//! - `build-corpus`: labeled directory tree → feature table (resumable)
//! - `fit`: feature table → model directory
//! - `evaluate`: model directory scored on a feature table
//! - `predict`: genre of audio files
//! - `config`: show or write the effective configuration

mod cli;
mod commands;

use clap::Parser;

use cli::{Cli, Command};
use sonare_core::config::{default_config_path, load_config};

fn main() -> anyhow::Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(&config_path);

    match cli.command {
        Command::Extract { file, json } => commands::extract(&file, json),
        Command::BuildCorpus(args) => commands::build_corpus(&config, args),
        Command::Fit(args) => commands::fit(&config, args),
        Command::Evaluate { table, model_dir } => commands::evaluate(&table, &model_dir),
        Command::Predict {
            model_dir,
            files,
            json,
        } => commands::predict(&config, &model_dir, &files, json),
        Command::Config { write } => commands::show_config(&config, &config_path, write),
    }
}
