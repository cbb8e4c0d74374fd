use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding `projects.json` and `ai_tools.json`.
    pub dir: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("./reports")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Eligible file patterns, matched against file names directly under the
    /// project source directory (the processing path does not recurse).
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["*.txt".to_string(), "*.md".to_string(), "*.xlsx".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    /// Deadline for one summarization call. The only timeout in a run.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

impl Config {
    pub fn projects_path(&self) -> PathBuf {
        self.storage.dir.join("projects.json")
    }

    pub fn tools_path(&self) -> PathBuf {
        self.storage.dir.join("ai_tools.json")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.collector.include_globs.is_empty() {
        anyhow::bail!("collector.include_globs must not be empty");
    }

    if config.ai.timeout_secs == 0 {
        anyhow::bail!("ai.timeout_secs must be > 0");
    }

    Ok(config)
}
