//! Configuration management for Schedcast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sweeper: SweeperConfig,
    pub twitter: Option<NetworkAppConfig>,
    pub linkedin: Option<NetworkAppConfig>,
    pub youtube: Option<YoutubeAppConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Publish attempts before a queue item is parked as failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_max_attempts() -> i64 {
    10
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// OAuth application registration for one network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkAppConfig {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

/// YouTube additionally needs the media store to resolve uploads from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeAppConfig {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    /// Base URL of the external media store; payload media keys are
    /// resolved relative to it.
    pub media_base_url: String,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/schedcast/schedcast.db".to_string(),
            },
            sweeper: SweeperConfig::default(),
            twitter: None,
            linkedin: None,
            youtube: None,
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SCHEDCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("schedcast").join("config.toml"))
}
