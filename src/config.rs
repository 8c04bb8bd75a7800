use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::matcher::DEFAULT_BATCH_SIZE;

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("", "", "facemind"));

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| match option_env!("FACEMIND_CONFIG_PATH") {
    Some(p) => PathBuf::from(p),
    None => PROJECT_DIRS
        .as_ref()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("facemind.toml")),
});

pub static GALLERY_PATH: Lazy<PathBuf> = Lazy::new(|| match option_env!("FACEMIND_GALLERY_PATH") {
    Some(p) => PathBuf::from(p),
    None => PROJECT_DIRS
        .as_ref()
        .map(|d| d.data_dir().join("gallery.bin"))
        .unwrap_or_else(|| PathBuf::from("gallery.bin")),
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum cosine similarity (exclusive) to accept a match
    pub threshold: f32,
    pub batch_size: usize,
    pub gallery_path: PathBuf,
    /// Embedding size of the feature extractor, if known ahead of enrollment
    pub dimension: Option<usize>,
    /// Consecutive face frames required before a capture is enrolled
    pub stable_frames: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            batch_size: DEFAULT_BATCH_SIZE,
            gallery_path: GALLERY_PATH.clone(),
            dimension: None,
            stable_frames: 20,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || !(-1.0..=1.0).contains(&self.threshold) {
            anyhow::bail!("threshold must be within [-1, 1], got {}", self.threshold);
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.dimension == Some(0) {
            anyhow::bail!("dimension must be at least 1");
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
