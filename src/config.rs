//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! server URL, its deployment mode, the selected database, and the last
//! used username. These are the non-secret persisted keys - token
//! material goes through `auth::CredentialStore` instead.
//!
//! Configuration is stored at `~/.config/billman/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::models::ServerMode;

/// Application name used for the config directory path
const APP_NAME: &str = "billman";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default server for development setups (the Flask dev port).
const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    pub server_mode: ServerMode,
    pub current_db: Option<String>,
    pub last_username: Option<String>,
    /// Set for configs that must not touch the filesystem (tests,
    /// embedded use). Never serialized.
    #[serde(skip)]
    pub ephemeral: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            server_mode: ServerMode::LocalDev,
            current_db: None,
            last_username: None,
            ephemeral: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    /// An in-memory config pointing at the given server; `save` is a
    /// no-op for these.
    pub fn ephemeral(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ephemeral: true,
            ..Self::default()
        }
    }

    pub fn save(&self) -> Result<()> {
        if self.ephemeral {
            return Ok(());
        }
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
