//! CLI configuration.
//!
//! Read from `~/.config/binstore/config.json` unless `--config` names
//! another file. Missing or unreadable fields fall back to defaults.

use std::path::{Path, PathBuf};

use binstore_store::StoreConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CliConfig {
    /// Root directory of the local backend.
    pub data_dir: PathBuf,
    pub store: StoreConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: home_dir().join(".local").join("share").join("binstore"),
            store: StoreConfig::default(),
        }
    }
}

impl CliConfig {
    /// Loads `path`, or the default location when `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path.map_or_else(default_config_path, Path::to_path_buf);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        match serde_json::from_str::<CliConfig>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: Option<&Path>) -> anyhow::Result<PathBuf> {
        let path = path.map_or_else(default_config_path, Path::to_path_buf);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(path)
    }
}

pub fn default_config_path() -> PathBuf {
    home_dir().join(".config").join("binstore").join("config.json")
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}
