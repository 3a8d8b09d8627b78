use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::core::ForestOptions;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub retrain: RetrainSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 5000 }

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_dataset_path")]
    pub dataset_path: String,
    #[serde(default = "default_feedback_path")]
    pub feedback_path: String,
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            feedback_path: default_feedback_path(),
            artifacts_dir: default_artifacts_dir(),
            backup_dir: default_backup_dir(),
        }
    }
}

fn default_dataset_path() -> String { "packing_data.json".to_string() }
fn default_feedback_path() -> String { "feedback_data.jsonl".to_string() }
fn default_artifacts_dir() -> String { "artifacts".to_string() }
fn default_backup_dir() -> String { "backups".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingSettings {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub max_depth: Option<usize>,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Synthetic records generated when a deployment starts with no data
    #[serde(default = "default_synthetic_records")]
    pub synthetic_records: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            seed: default_seed(),
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            threshold: default_threshold(),
            synthetic_records: default_synthetic_records(),
        }
    }
}

impl TrainingSettings {
    pub fn forest_options(&self) -> ForestOptions {
        ForestOptions {
            n_estimators: self.n_estimators,
            seed: self.seed,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            threshold: self.threshold,
        }
    }
}

fn default_n_estimators() -> usize { 100 }
fn default_seed() -> u64 { 42 }
fn default_min_samples_split() -> usize { 2 }
fn default_threshold() -> f64 { 0.5 }
fn default_synthetic_records() -> usize { 100 }

#[derive(Debug, Clone, Deserialize)]
pub struct RetrainSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Number of old cycle directories to keep, unlimited when unset
    pub keep_cycles: Option<usize>,
}

impl Default for RetrainSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            keep_cycles: None,
        }
    }
}

fn default_true() -> bool { true }
fn default_interval_secs() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with PACKING__)
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., PACKING__SERVER__PORT -> server.port
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?
            .try_deserialize()
    }
}

fn environment() -> Environment {
    Environment::with_prefix("PACKING")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_training() {
        let training = TrainingSettings::default();
        assert_eq!(training.n_estimators, 100);
        assert_eq!(training.seed, 42);
        assert_eq!(training.threshold, 0.5);
        assert_eq!(training.forest_options(), ForestOptions::default());
    }

    #[test]
    fn test_default_storage_and_logging() {
        let settings = Settings::default();
        assert_eq!(settings.storage.feedback_path, "feedback_data.jsonl");
        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.retrain.interval_secs, 30);
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.logging.format, "json");
    }

    #[test]
    fn test_load_from_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[training]\nn_estimators = 10\n\n[retrain]\ninterval_secs = 5").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.training.n_estimators, 10);
        assert_eq!(settings.training.seed, 42);
        assert_eq!(settings.retrain.interval_secs, 5);
        assert_eq!(settings.storage.artifacts_dir, "artifacts");
    }
}
