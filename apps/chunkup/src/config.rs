//! Client configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/chunkup/config.toml`
//! - Windows: `%APPDATA%/chunkup/config.toml`
//!
//! A missing file is not an error; every field has a default.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use chunkup_uploader::UploadConfig;

use crate::Cli;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base address of the upload service.
    #[serde(default)]
    pub server: Option<String>,

    #[serde(default)]
    pub upload: UploadConfig,
}

impl AppConfig {
    /// Loads `explicit` if given, else the platform default path. Only an
    /// explicitly named file has to exist.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = config_path();
                if !path.exists() {
                    tracing::debug!(path = %path.display(), "no config file, using defaults");
                    return Ok(Self::default());
                }
                path
            }
        };
        Self::from_file(&path)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration read");
        Ok(config)
    }

    /// Applies command-line flags on top of the file values.
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(server) = &cli.server {
            self.server = Some(server.clone());
        }
        if let Some(chunk_size) = cli.chunk_size {
            self.upload.chunk_size = chunk_size;
        }
        if let Some(timeout_ms) = cli.timeout_ms {
            self.upload.request_timeout_ms = timeout_ms;
        }
        if let Some(concurrency) = cli.concurrency {
            self.upload.max_concurrency = concurrency;
        }
        if let Some(retries) = cli.retries {
            self.upload.retry.max_attempts = retries;
        }
        self
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("chunkup")
            .join("config.toml")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("chunkup").join("config.toml")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp/chunkup/config.toml")
    }
}
