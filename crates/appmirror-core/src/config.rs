//! appmirror.toml configuration parser.
//!
//! Every section is optional; missing values fall back to the defaults the
//! demo frontend expects (port 8082, 3s preparation, 5s installation).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("max_upload_bytes must be greater than zero")]
    ZeroUploadLimit,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub lifecycle: LifecycleConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

/// Where uploaded artifacts are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobBackend {
    #[default]
    Local,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BlobBackend,
    /// Directory receiving uploaded build artifacts (`local` backend).
    pub upload_dir: PathBuf,
    /// Largest accepted upload request body.
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Time a session spends in `preparing` (e.g. "3s", "250ms", "1m").
    pub ready_delay: String,
    /// Time a session spends in `installing`.
    pub install_delay: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Exact origins allowed in addition to localhost and ngrok tunnels.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8082,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BlobBackend::Local,
            upload_dir: PathBuf::from("./uploads/builds"),
            max_upload_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ready_delay: "3s".to_string(),
            install_delay: "5s".to_string(),
        }
    }
}

impl LifecycleConfig {
    pub fn ready_delay(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.ready_delay).ok_or_else(|| ConfigError::InvalidDuration {
            field: "lifecycle.ready_delay",
            value: self.ready_delay.clone(),
        })
    }

    pub fn install_delay(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.install_delay).ok_or_else(|| ConfigError::InvalidDuration {
            field: "lifecycle.install_delay",
            value: self.install_delay.clone(),
        })
    }
}

impl CorsConfig {
    /// Parse a comma-separated origin list, as found in `CORS_ALLOWED_ORIGINS`.
    pub fn from_env_list(list: &str) -> Self {
        Self {
            allowed_origins: list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

impl MirrorConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MirrorConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check values that serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lifecycle.ready_delay()?;
        self.lifecycle.install_delay()?;
        if self.storage.max_upload_bytes == 0 {
            return Err(ConfigError::ZeroUploadLimit);
        }
        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "1m", or bare seconds ("10").
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
