// Server configuration
// Loaded from ~/.config/crosswalk/config.toml; every field can be overridden
// by a command-line flag, and the token also by CROSSWALK_TOKEN.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// host:port the server binds. Loopback by default; this service trusts
    /// its token, not its network.
    pub listen: String,

    /// SQLite database path.
    pub db_path: PathBuf,

    /// Shared-secret bearer token clients must present in `hello`. The
    /// server refuses to start without one.
    pub token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:4780".to_string(),
            db_path: default_db_path(),
            token: None,
        }
    }
}

impl ServerConfig {
    /// Load from `path`. A missing file yields defaults so a flag-only
    /// launch works.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Default config file location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|c| c.join("crosswalk/config.toml"))
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crosswalk/crosswalk.db")
}

#[derive(Debug)]
pub enum ConfigError {
    /// Config file exists but could not be read.
    Read { path: String, message: String },
    /// TOML parse / deserialization error.
    Parse { path: String, message: String },
    /// No token configured anywhere.
    MissingToken,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, message } => write!(f, "cannot read config '{path}': {message}"),
            Self::Parse { path, message } => write!(f, "cannot parse config '{path}': {message}"),
            Self::MissingToken => write!(
                f,
                "no token configured; set `token` in the config file, pass --token, or export CROSSWALK_TOKEN"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
