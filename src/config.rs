//! Harness configuration, persisted as TOML.
//!
//! Everything the pipeline needs is passed in through [`EvalConfig`]; the
//! library never reads environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::Alternative;
use crate::error::{ConfigError, ConfigResult};
use crate::pairwise::StructuralMetric;
use crate::request::SchemaVersion;
use crate::trainer::TrainerConfig;

/// Top-level harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Base URL of the synthesis service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub schema_version: SchemaVersion,
    /// Root of the `{language}/{experiment}/` results tree.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Neighbors exported per program.
    #[serde(default = "default_neighbors")]
    pub neighbors: usize,
    /// Column holding structural scores in the correlation input file.
    #[serde(default = "default_ground_truth_column")]
    pub ground_truth_column: String,
    #[serde(default)]
    pub alternative: Alternative,
    #[serde(default)]
    pub structural_metric: StructuralMetric,
    /// Uniform histogram bucket count.
    #[serde(default = "default_buckets")]
    pub buckets: usize,
    #[serde(default)]
    pub trainer: TrainerConfig,
}

fn default_endpoint() -> String {
    "http://localhost:8080".into()
}
fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}
fn default_neighbors() -> usize {
    5
}
fn default_ground_truth_column() -> String {
    "ast".into()
}
fn default_buckets() -> usize {
    crate::analysis::histogram::DEFAULT_BUCKETS
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            schema_version: SchemaVersion::default(),
            results_dir: default_results_dir(),
            neighbors: default_neighbors(),
            ground_truth_column: default_ground_truth_column(),
            alternative: Alternative::default(),
            structural_metric: StructuralMetric::default(),
            buckets: default_buckets(),
            trainer: TrainerConfig::default(),
        }
    }
}

impl EvalConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load `path` if given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
