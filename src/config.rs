use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub import: ImportConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Root of the CVE corpus checkout. Documents live at
    /// `<root>/<year>/<Nxxx>/<CVE-id>.json`.
    pub root: PathBuf,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            manifest_path: default_manifest_path(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("data/import_failures.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.import.batch_size == 0 {
        anyhow::bail!("import.batch_size must be > 0");
    }

    if config.server.bind.is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    Ok(config)
}
