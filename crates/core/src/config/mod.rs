//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PRECACHE_*)
//! 2. TOML config file (explicit path, or PRECACHE_CONFIG_FILE)
//! 3. Built-in defaults
//!
//! The cache generation identifier and the asset manifest live here rather
//! than in code, so a deployment bumps the generation by changing config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Request;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PRECACHE_*)
/// 2. TOML config file
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name of the current cache generation.
    ///
    /// Changing it is the only way to invalidate cached assets: the next
    /// activation deletes every generation with a different name.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Paths pre-cached at install time, resolved against `origin`.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Origin of the application whose assets are cached.
    ///
    /// Set via PRECACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to SQLite cache storage.
    ///
    /// Set via PRECACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Transport timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Manifest path served from cache when a navigation request misses
    /// both network and cache. Unset keeps the empty result.
    #[serde(default)]
    pub offline_fallback: Option<String>,
}

fn default_cache_name() -> String {
    "ai-farm-cache-v4".into()
}

fn default_precache() -> Vec<String> {
    vec!["/".into(), "/static/index.html".into(), "/static/manifest.json".into()]
}

fn default_origin() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./precache.sqlite")
}

fn default_user_agent() -> String {
    "precache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            precache: default_precache(),
            origin: default_origin(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            offline_fallback: None,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration, reading the TOML file named by
    /// `PRECACHE_CONFIG_FILE` if set.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var("PRECACHE_CONFIG_FILE").ok().map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    /// Load configuration from defaults, an optional TOML file and the
    /// environment, then validate it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(
            Env::prefixed("PRECACHE_")
                .ignore(&["CONFIG_FILE", "LOG_FORMAT"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The configured origin as a URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Resolve an application path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        self.origin_url()?
            .join(path)
            .map_err(|e| ConfigError::Invalid { field: "precache".into(), reason: format!("{path}: {e}") })
    }

    /// GET requests for every manifest entry, in manifest order.
    pub fn manifest_requests(&self) -> Result<Vec<Request>, ConfigError> {
        self.precache
            .iter()
            .map(|path| self.resolve(path).map(Request::get))
            .collect()
    }

    /// GET request for the offline fallback asset, if configured.
    pub fn fallback_request(&self) -> Result<Option<Request>, ConfigError> {
        self.offline_fallback
            .as_deref()
            .map(|path| self.resolve(path).map(Request::get))
            .transpose()
    }
}
