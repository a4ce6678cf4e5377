//! Configuration loading
//!
//! Settings come from a TOML file at `~/.config/preview-lane/config.toml`
//! (or a path passed on the command line). A missing file yields the
//! defaults; a present file with unknown keys is rejected so typos do not
//! silently fall back.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::pipeline::{PipelineConfig, DEFAULT_ARCHIVE_NAME};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("no API token configured; set api_token in {path}")]
    MissingToken { path: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the build service API.
    pub api_base_url: String,
    /// Endpoint of the delivery object store.
    pub store_endpoint: String,
    /// Bearer token for the build service.
    pub api_token: String,
    /// File name for the temporary archive.
    pub archive_name: String,
    /// Upload part size in MiB.
    pub part_size_mib: usize,
    /// Status-check budget for directory builds.
    pub poll_attempts: u32,
    /// Delay between status checks, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.previewlane.dev/v1".to_string(),
            store_endpoint: "https://objects.previewlane.dev".to_string(),
            api_token: String::new(),
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            part_size_mib: 5,
            poll_attempts: 20,
            poll_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// A missing file is not an error; it means defaults.
    pub fn load(path: Option<&Path>) -> Result<(Self, PathBuf), ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_path(),
        };

        if !path.exists() {
            return Ok((Self::default(), path));
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        Ok((config, path))
    }

    /// Fail when no token is configured; remote calls cannot work without
    /// one.
    pub fn ensure_token(&self, path: &Path) -> Result<(), ConfigError> {
        if self.api_token.trim().is_empty() {
            return Err(ConfigError::MissingToken {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    /// `path` is where these settings came from; failures that need the
    /// user to edit the file name it.
    pub fn pipeline_config(&self, path: &Path) -> PipelineConfig {
        PipelineConfig {
            archive_path: PathBuf::from(&self.archive_name),
            part_size: self.part_size_mib * 1024 * 1024,
            poll_attempts: self.poll_attempts,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            config_path: path.to_path_buf(),
        }
    }
}

/// `~/.config/preview-lane/config.toml`, or a relative fallback when no
/// home directory is known.
pub fn default_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".config")
        .join("preview-lane")
        .join("config.toml")
}
