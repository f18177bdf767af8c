//! Configuration loading for Causalyx.
//! Reads causalyx.toml from the current directory or path in CAUSALYX_CONFIG env var.

use anyhow::Context;
use causalyx_common::{EngineConfig, KnowledgeBase, ScoringThresholds, TemporalWindows};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};


/// Where a loaded `Config` came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file at this path; built-in defaults.
    Defaults(PathBuf),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub scoring: ScoringThresholds,
    #[serde(default)]
    pub temporal: TemporalWindows,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// YAML or JSON knowledge base. The embedded default is used when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// JSON array of case bundles.
    #[serde(default = "default_input")]
    pub input: PathBuf,
    /// Report destination; stdout when unset.
    pub output: Option<PathBuf>,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_input()   -> PathBuf { PathBuf::from("cases.json") }
fn default_workers() -> usize   { 4 }

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: None,
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Used when RUST_LOG is not set.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String { "causalyx=debug,info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl Config {
    /// Loads the file named by CAUSALYX_CONFIG, or causalyx.toml.
    pub fn load() -> anyhow::Result<(Self, ConfigSource)> {
        let path = std::env::var("CAUSALYX_CONFIG")
            .unwrap_or_else(|_| "causalyx.toml".to_string());
        Self::load_from(Path::new(&path))
    }

    /// Built-in defaults apply only when the file is absent. A file that
    /// exists but fails to read, parse or validate is an error.
    pub fn load_from(path: &Path) -> anyhow::Result<(Self, ConfigSource)> {
        if !path.exists() {
            return Ok((Self::default(), ConfigSource::Defaults(path.to_path_buf())));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch.workers == 0 {
            anyhow::bail!("batch.workers must be at least 1");
        }
        self.engine_config().validate()?;
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            scoring: self.scoring.clone(),
            temporal: self.temporal.clone(),
        }
    }

    pub fn load_knowledge_base(&self) -> anyhow::Result<KnowledgeBase> {
        let kb = match &self.knowledge.path {
            Some(path) => KnowledgeBase::from_path(path)?,
            None => KnowledgeBase::embedded()?,
        };
        Ok(kb)
    }
}
