//! Mirror configuration
//!
//! Loaded from `mirror.json` in the config directory, if present, then
//! overridden by environment variables:
//! 1. `MIRROR_DATABASE` - path of the SQLite database
//! 2. `MIRROR_TOKEN_FILE` - path of the stored access token
//! 3. `MIRROR_PUBSUB_TOPIC` - Pub/Sub topic for push registration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::sync::SyncOptions;

/// Config filename in the config directory
pub const CONFIG_FILE: &str = "mirror.json";

const DATABASE_FILE: &str = "mirror.sqlite";
const TOKEN_FILE: &str = "token.json";

const DATABASE_ENV: &str = "MIRROR_DATABASE";
const TOKEN_FILE_ENV: &str = "MIRROR_TOKEN_FILE";
const PUBSUB_TOPIC_ENV: &str = "MIRROR_PUBSUB_TOPIC";

/// Settings for one mirror installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// SQLite database; defaults to the data directory
    pub database_path: Option<PathBuf>,
    /// Token JSON written by the login flow; defaults to the config directory
    pub token_path: Option<PathBuf>,
    /// Topic passed to `users.watch`
    pub pubsub_topic: Option<String>,
    pub page_size: usize,
    pub inbox_label: String,
    pub inbox_query: Option<String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        let options = SyncOptions::default();
        Self {
            database_path: None,
            token_path: None,
            pubsub_topic: None,
            page_size: options.page_size,
            inbox_label: options.inbox_label,
            inbox_query: options.inbox_query,
        }
    }
}

impl MirrorConfig {
    /// Load from the config directory and the environment
    pub fn load() -> Result<Self> {
        let mut cfg = if config::config_exists(CONFIG_FILE) {
            config::load_json(CONFIG_FILE)?
        } else {
            Self::default()
        };
        cfg.apply_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Load from a specific JSON file, without environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Write this config to `mirror.json` in the config directory
    pub fn save(&self) -> Result<PathBuf> {
        config::save_json(CONFIG_FILE, self)?;
        config::config_path(CONFIG_FILE).context("Could not determine config directory")
    }

    /// Write this config to a specific JSON file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        config::save_json_file(path, self)
    }

    /// Apply overrides from `lookup` (normally the process environment)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = lookup(DATABASE_ENV) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(TOKEN_FILE_ENV) {
            self.token_path = Some(PathBuf::from(path));
        }
        if let Some(topic) = lookup(PUBSUB_TOPIC_ENV) {
            self.pubsub_topic = Some(topic);
        }
    }

    /// Resolved database path
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => config::data_path(DATABASE_FILE).context("Could not determine data directory"),
        }
    }

    /// Resolved token file path
    pub fn token_path(&self) -> Result<PathBuf> {
        match &self.token_path {
            Some(path) => Ok(path.clone()),
            None => config::config_path(TOKEN_FILE).context("Could not determine config directory"),
        }
    }

    /// Sync tunables carried by this config
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            page_size: self.page_size.max(1),
            inbox_label: self.inbox_label.clone(),
            inbox_query: self.inbox_query.clone().filter(|q| !q.trim().is_empty()),
        }
    }
}
