//! Serializable configuration, loadable from a TOML file.
//!
//! Every field has a default so a partial file (or none at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DataError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridcacheConfig {
    pub store: StoreConfig,
    pub fetch: FetchOptions,
    pub http: HttpConfig,
}

impl GridcacheConfig {
    /// Load a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DataError::Storage(format!("read config {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, DataError> {
        toml::from_str(text).map_err(|e| DataError::Storage(format!("invalid config: {e}")))
    }
}

/// Where the cache lives and how to seed it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Backing file of the cache.
    pub path: PathBuf,
    /// Snapshot downloaded once when `path` does not exist.
    pub seed_url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cache.json"),
            seed_url: None,
        }
    }
}

/// Orchestrator switches fixed at construction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchOptions {
    /// Log cache decisions at `info` instead of `debug`.
    pub verbose: bool,
    /// Never touch the network; serve whatever is cached.
    pub cache_only: bool,
}

/// HTTP transport tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub breaker_cooldown_secs: u64,
    pub breaker_threshold: u32,
    pub user_agent: String,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 500,
            breaker_cooldown_secs: 30 * 60,
            breaker_threshold: 3,
            user_agent: concat!("gridcache/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = GridcacheConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, GridcacheConfig::default());
        assert_eq!(cfg.store.path, PathBuf::from("cache.json"));
        assert_eq!(cfg.http.max_retries, 3);
    }

    #[test]
    fn partial_sections_override() {
        let cfg = GridcacheConfig::from_toml_str(
            r#"
            [store]
            path = "/tmp/grid.json"
            seed_url = "https://example.org/seed.json"

            [fetch]
            cache_only = true

            [http]
            timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(cfg.store.path, PathBuf::from("/tmp/grid.json"));
        assert_eq!(cfg.store.seed_url.as_deref(), Some("https://example.org/seed.json"));
        assert!(cfg.fetch.cache_only);
        assert!(!cfg.fetch.verbose);
        assert_eq!(cfg.http.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.http.breaker_threshold, 3);
    }

    #[test]
    fn invalid_toml_is_storage_error() {
        assert!(matches!(
            GridcacheConfig::from_toml_str("[store\npath ="),
            Err(DataError::Storage(_))
        ));
    }
}
