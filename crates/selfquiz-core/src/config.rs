//! Application configuration management.
//!
//! This module handles loading the configuration that drives the worker
//! and the offline cache: cache namespace names and bounds, the precache
//! manifest, the application origin and the upload limits.
//!
//! Configuration is stored at `~/.config/selfquiz/config.json`. Every field
//! is optional in the file and falls back to the built-in defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::quiz::{ValidationConfig, DEFAULT_MIN_CHOICES};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "selfquiz";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Cache storage snapshot file name in the cache directory
const SNAPSHOT_FILE: &str = "cache-storage.json";

/// Environment variable that overrides the configured origin
pub const ORIGIN_ENV_VAR: &str = "SELFQUIZ_ORIGIN";

/// Static asset namespace. Bump the version on every release so activation
/// clears the previous one.
pub const DEFAULT_STATIC_CACHE: &str = "selfquiz-cache-v1.3.24";

/// Runtime cache for quiz data (JSON) files
pub const DEFAULT_DATA_CACHE: &str = "selfquiz-data-v1";

/// Runtime cache for web fonts
pub const DEFAULT_FONT_CACHE: &str = "selfquiz-fonts-v1";

/// Quiz files users revisit are few; ten covers a study session.
pub const DEFAULT_DATA_MAX_ENTRIES: usize = 10;

/// One font family in a handful of weights.
pub const DEFAULT_FONT_MAX_ENTRIES: usize = 5;

pub const DEFAULT_ORIGIN: &str = "http://localhost:8080/";

/// Application shell served for every navigation while offline
pub const DEFAULT_SHELL_URL: &str = "./index.html";

/// Uploads larger than 10 MB are rejected before parsing completes.
pub const DEFAULT_SIZE_LIMIT_BYTES: u64 = 10 * 1024 * 1024;

/// Precache manifest: local app files plus the external stylesheets and fonts.
pub const DEFAULT_ASSETS: &[&str] = &[
    "./",
    "./index.html",
    "./style.css",
    "./app.js",
    "./manifest.webmanifest",
    "./json-worker.js",
    "./icons/icon-192.png",
    "./icons/icon-512.png",
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css",
    "https://cdn.jsdelivr.net/npm/bootstrap-icons@1.11.3/font/bootstrap-icons.min.css",
    "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;700&display=swap",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL relative asset paths are resolved against.
    pub origin: String,
    pub static_cache: String,
    pub data_cache: String,
    pub font_cache: String,
    pub data_max_entries: usize,
    pub font_max_entries: usize,
    pub shell_url: String,
    pub assets: Vec<String>,
    /// Upload ceiling in bytes; `None` disables the check.
    pub size_limit_bytes: Option<u64>,
    pub min_choices: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            static_cache: DEFAULT_STATIC_CACHE.to_string(),
            data_cache: DEFAULT_DATA_CACHE.to_string(),
            font_cache: DEFAULT_FONT_CACHE.to_string(),
            data_max_entries: DEFAULT_DATA_MAX_ENTRIES,
            font_max_entries: DEFAULT_FONT_MAX_ENTRIES,
            shell_url: DEFAULT_SHELL_URL.to_string(),
            assets: DEFAULT_ASSETS.iter().map(|url| url.to_string()).collect(),
            size_limit_bytes: Some(DEFAULT_SIZE_LIMIT_BYTES),
            min_choices: DEFAULT_MIN_CHOICES,
        }
    }
}

impl Config {
    /// Load from the user config directory, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            debug!(path = %path.display(), "Config loaded");
            Ok(config)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(origin) = std::env::var(ORIGIN_ENV_VAR) {
            if !origin.trim().is_empty() {
                debug!(%origin, "Origin overridden from environment");
                self.origin = origin;
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Where the cache storage snapshot is kept between runs.
    pub fn snapshot_path(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join(SNAPSHOT_FILE))
    }

    pub fn validation_config(&self) -> ValidationConfig {
        ValidationConfig::with_min_choices(self.min_choices)
    }

    /// Namespaces that survive activation.
    pub fn allowed_caches(&self) -> [&str; 3] {
        [&self.static_cache, &self.data_cache, &self.font_cache]
    }
}
