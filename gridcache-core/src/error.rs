//! Structured error types for cache and fetch operations.
//!
//! One enum covers the whole core so that the orchestrator can propagate
//! adapter, transport and storage failures with `?` and the CLI can render
//! them uniformly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("seed cache download from {url} failed: {reason}")]
    BootstrapDownload { url: String, reason: String },

    #[error("fetch failed for {source_id}: {reason}")]
    Fetch { source_id: String, reason: String },

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("could not parse payload from {source_id}: {reason}")]
    Parse { source_id: String, reason: String },

    #[error("no cached data for '{source_id}' and network access is disabled")]
    NotCached { source_id: String },

    #[error("cache storage error: {0}")]
    Storage(String),

    #[error("table shape error: {0}")]
    Shape(String),
}

impl DataError {
    pub(crate) fn parse(source_id: &str, reason: impl Into<String>) -> Self {
        DataError::Parse {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn fetch(source_id: &str, reason: impl Into<String>) -> Self {
        DataError::Fetch {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }

    /// True for transport-level failures (network, HTTP status, rate limit, breaker).
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            DataError::Fetch { .. }
                | DataError::RateLimited { .. }
                | DataError::CircuitBreakerTripped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_variants_are_grouped() {
        assert!(DataError::fetch("u", "boom").is_fetch_failure());
        assert!(DataError::CircuitBreakerTripped.is_fetch_failure());
        assert!(DataError::RateLimited { retry_after_secs: 5 }.is_fetch_failure());
        assert!(!DataError::parse("u", "bad").is_fetch_failure());
        assert!(!DataError::NotCached { source_id: "u".into() }.is_fetch_failure());
    }

    #[test]
    fn not_cached_message_names_source() {
        let err = DataError::NotCached {
            source_id: "http://x/y".into(),
        };
        assert!(err.to_string().contains("http://x/y"));
    }
}
