//! Configuration validation rules.

use std::collections::HashSet;

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `cache_name` is empty, and
    /// `ConfigError::Invalid` if:
    /// - `origin` is not an http(s) URL
    /// - a `precache` entry is blank, repeated or does not resolve
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `offline_fallback` is not one of the `precache` entries
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "cache_name".into(),
                hint: "Set PRECACHE_CACHE_NAME to a versioned label such as app-cache-v1".into(),
            });
        }

        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(invalid("origin", format!("unsupported scheme: {}", origin.scheme())));
        }

        let mut seen = HashSet::new();
        for path in &self.precache {
            if path.trim().is_empty() {
                return Err(invalid("precache", "entries must not be empty"));
            }
            if !seen.insert(path.as_str()) {
                return Err(invalid("precache", format!("duplicate entry: {path}")));
            }
            self.resolve(path)?;
        }
        if self.precache.is_empty() {
            tracing::warn!("precache manifest is empty; install will cache nothing");
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if let Some(fallback) = &self.offline_fallback
            && !seen.contains(fallback.as_str())
        {
            return Err(invalid("offline_fallback", format!("{fallback} is not in the precache manifest")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_cache_name() {
        let config = AppConfig { cache_name: "  ".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Missing { field, .. }) if field == "cache_name"));
    }

    #[test]
    fn test_validate_bad_origin() {
        let config = AppConfig { origin: "not a url".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "origin"));
    }

    #[test]
    fn test_validate_non_http_origin() {
        let config = AppConfig { origin: "file:///srv/app".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "origin"));
    }

    #[test]
    fn test_validate_duplicate_manifest_entry() {
        let config = AppConfig { precache: vec!["/".into(), "/".into()], ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "precache"));
    }

    #[test]
    fn test_validate_blank_manifest_entry() {
        let config = AppConfig { precache: vec!["/".into(), " ".into()], ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "precache"));
    }

    #[test]
    fn test_validate_empty_manifest_allowed() {
        let config = AppConfig { precache: Vec::new(), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let too_small = AppConfig { timeout_ms: 50, ..Default::default() };
        assert!(matches!(too_small.validate(), Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));

        let too_large = AppConfig { timeout_ms: 301_000, ..Default::default() };
        assert!(matches!(too_large.validate(), Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));

        let edges = [100, 300_000];
        for timeout_ms in edges {
            assert!(AppConfig { timeout_ms, ..Default::default() }.validate().is_ok());
        }
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "user_agent"));
    }

    #[test]
    fn test_validate_fallback_must_be_precached() {
        let config = AppConfig { offline_fallback: Some("/offline.html".into()), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "offline_fallback"));

        let config = AppConfig { offline_fallback: Some("/static/index.html".into()), ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
