//! Pipeline configuration
//!
//! Stored as YAML. Default location: `<config dir>/sonare/config.yaml`
//! (e.g. `~/.config/sonare/config.yaml` on Linux).
//!
//! Analysis constants (FFT size, hop, mel bands, ...) are deliberately absent:
//! they are fixed in [`crate::types`] so a model can never be served with
//! different extraction settings than it was trained with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::corpus::{CorpusBuildConfig, ExistingOutput};
use crate::model::{KnnConfig, KnnMetric, KnnWeights, TrainingOptions};
use crate::preprocessing::PcaConfig;
use crate::types::DEFAULT_AUDIO_EXTENSIONS;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub corpus: CorpusSettings,
    pub preprocessing: PreprocessingSettings,
    pub model: ModelSettings,
    pub training: TrainingSettings,
}

/// Corpus building section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    /// Files per committed batch
    pub batch_size: usize,
    /// Parallel extraction threads (1-64)
    pub workers: usize,
    /// Accepted audio extensions
    pub extensions: Vec<String>,
    /// Policy for an existing output table
    pub existing_output: ExistingOutput,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            workers: std::thread::available_parallelism().map_or(4, |n| n.get()),
            extensions: DEFAULT_AUDIO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            existing_output: ExistingOutput::default(),
        }
    }
}

/// Preprocessing section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingSettings {
    /// Keep this many principal components; `None` disables PCA
    pub pca_components: Option<usize>,
}

/// Classifier section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Neighbours consulted per prediction
    pub k: usize,
    pub weights: KnnWeights,
    pub metric: KnnMetric,
}

impl Default for ModelSettings {
    fn default() -> Self {
        let knn = KnnConfig::default();
        Self {
            k: knn.k,
            weights: knn.weights,
            metric: knn.metric,
        }
    }
}

/// Train/test split section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// Held-out fraction in (0, 1)
    pub test_size: f64,
    pub seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            test_size: 0.05,
            seed: 42,
        }
    }
}

impl Config {
    /// Clamp values into their supported ranges
    pub fn validate(&mut self) {
        self.corpus.batch_size = self.corpus.batch_size.clamp(1, 10_000);
        self.corpus.workers = self.corpus.workers.clamp(1, 64);

        // Extensions are compared case-insensitively, without the dot
        self.corpus.extensions = self
            .corpus
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        if self.corpus.extensions.is_empty() {
            self.corpus.extensions = CorpusSettings::default().extensions;
        }

        if self.preprocessing.pca_components == Some(0) {
            self.preprocessing.pca_components = None;
        }

        self.model.k = self.model.k.max(1);

        if !(self.training.test_size > 0.0 && self.training.test_size < 1.0) {
            log::warn!(
                "Config::validate: test_size {} out of range, using {}",
                self.training.test_size,
                TrainingSettings::default().test_size
            );
            self.training.test_size = TrainingSettings::default().test_size;
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Corpus build parameters for a root and output table
    pub fn corpus_build(&self, root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> CorpusBuildConfig {
        CorpusBuildConfig {
            root: root.into(),
            output: output.into(),
            batch_size: self.corpus.batch_size,
            workers: self.corpus.workers,
            extensions: self.corpus.extensions.clone(),
            existing_output: self.corpus.existing_output,
        }
    }

    pub fn training_options(&self) -> TrainingOptions {
        TrainingOptions {
            pca: self
                .preprocessing
                .pca_components
                .map(|n_components| PcaConfig { n_components }),
            knn: KnnConfig {
                k: self.model.k,
                weights: self.model.weights,
                metric: self.model.metric,
            },
            test_size: Some(self.training.test_size),
            seed: self.training.seed,
        }
    }
}

/// Get the default config file path
///
/// Returns: `<config dir>/sonare/config.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sonare")
        .join("config.yaml")
}

/// Load configuration from a YAML file
///
/// Missing or unparsable files fall back to defaults with a warning; the
/// result is always validated.
pub fn load_config(path: &Path) -> Config {
    log::info!("load_config: Loading from {:?}", path);

    let mut config = if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        Config::default()
    } else {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("load_config: Failed to parse config: {}, using defaults", e);
                    Config::default()
                }
            },
            Err(e) => {
                log::warn!("load_config: Failed to read config file: {}, using defaults", e);
                Config::default()
            }
        }
    };

    config.validate();
    config
}

/// Save configuration to a YAML file, creating parent directories
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = config.to_yaml()?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.corpus.batch_size, 10);
        assert_eq!(config.corpus.extensions, vec!["wav"]);
        assert_eq!(config.corpus.existing_output, ExistingOutput::Resume);
        assert_eq!(config.model.k, 5);
        assert_eq!(config.training.test_size, 0.05);
        assert_eq!(config.training.seed, 42);
        assert!(config.preprocessing.pca_components.is_none());
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config = load_config(Path::new("/nonexistent/path/config.yaml"));
        let mut expected = Config::default();
        expected.validate();
        assert_eq!(config, expected);
    }

    #[test]
    fn test_validation_clamps_values() {
        let mut config = Config::default();
        config.corpus.batch_size = 0;
        config.corpus.workers = 500;
        config.corpus.extensions = vec![".WAV".to_string(), " ".to_string()];
        config.preprocessing.pca_components = Some(0);
        config.model.k = 0;
        config.training.test_size = 1.5;
        config.validate();

        assert_eq!(config.corpus.batch_size, 1);
        assert_eq!(config.corpus.workers, 64);
        assert_eq!(config.corpus.extensions, vec!["wav"]);
        assert_eq!(config.preprocessing.pca_components, None);
        assert_eq!(config.model.k, 1);
        assert_eq!(config.training.test_size, 0.05);
    }

    #[test]
    fn test_partial_yaml_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "model:\n  k: 7\n  weights: distance\ncorpus:\n  existing_output: fail\n",
        )
        .unwrap();

        let config = load_config(&path);
        assert_eq!(config.model.k, 7);
        assert_eq!(config.model.weights, KnnWeights::Distance);
        assert_eq!(config.model.metric, KnnMetric::Euclidean);
        assert_eq!(config.corpus.existing_output, ExistingOutput::Fail);
        assert_eq!(config.corpus.batch_size, 10);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.yaml");

        let mut config = Config::default();
        config.preprocessing.pca_components = Some(3);
        config.corpus.workers = 2;
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path);
        assert_eq!(loaded, config);
        let options = loaded.training_options();
        assert_eq!(options.pca, Some(PcaConfig { n_components: 3 }));
        assert_eq!(options.test_size, Some(0.05));
    }

    #[test]
    fn test_invalid_yaml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "model: [this is not a map").unwrap();
        assert_eq!(load_config(&path).model.k, 5);
    }
}
