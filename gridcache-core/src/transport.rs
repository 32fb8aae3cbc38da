//! Byte transport used by vendor adapters and the seed bootstrap.
//!
//! `HttpTransport` is a blocking reqwest client with exponential backoff and
//! a shared circuit breaker. Timeouts are the transport's business; the
//! orchestrator imposes none.

use crate::circuit_breaker::CircuitBreaker;
use crate::config::HttpConfig;
use crate::error::DataError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fetch the raw body behind a URL.
pub trait Transport: Send + Sync {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, DataError>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
    breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, DataError> {
        let breaker = Arc::new(CircuitBreaker::new(
            config.breaker_cooldown(),
            config.breaker_threshold,
        ));
        Self::with_breaker(config, breaker)
    }

    /// Build a transport sharing an existing breaker.
    pub fn with_breaker(
        config: &HttpConfig,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DataError::fetch("http client", format!("client setup: {e}")))?;

        Ok(Self {
            client,
            breaker,
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl Transport for HttpTransport {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, DataError> {
        if !self.breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let wait = backoff(self.base_delay, attempt);
                warn!(url, attempt, ?wait, "publication server unavailable, backing off");
                std::thread::sleep(wait);
            }

            if !self.breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }

            debug!(url, attempt, "downloading");
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::FORBIDDEN {
                        self.breaker.trip();
                        return Err(DataError::CircuitBreakerTripped);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        self.breaker.record_failure();
                        let retry_after = resp
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(DataError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status.is_server_error() {
                        self.breaker.record_failure();
                        last_error =
                            Some(DataError::fetch(url, format!("server answered {status}")));
                        continue;
                    }

                    if !status.is_success() {
                        return Err(DataError::fetch(url, format!("server answered {status}")));
                    }

                    let body = resp
                        .bytes()
                        .map_err(|e| DataError::fetch(url, format!("incomplete download: {e}")))?;
                    self.breaker.record_success();
                    return Ok(body.to_vec());
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    self.breaker.record_failure();
                    last_error = Some(DataError::fetch(url, format!("no connection: {e}")));
                }
                Err(e) => return Err(DataError::fetch(url, e.to_string())),
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::fetch(url, "gave up after retries")))
    }
}

/// Wait before retry `attempt` (1-based): `base * 2^(attempt - 1)`, saturating.
fn backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> HttpConfig {
        HttpConfig {
            timeout_secs: 2,
            max_retries: 0,
            base_delay_ms: 1,
            ..HttpConfig::default()
        }
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff(base, 1), base);
        assert_eq!(backoff(base, 3), Duration::from_secs(2));
        // Past 2^31 the factor saturates instead of overflowing.
        assert_eq!(backoff(base, 40), base.saturating_mul(u32::MAX));
        assert_eq!(backoff(Duration::MAX, 5), Duration::MAX);
    }

    #[test]
    fn open_breaker_refuses_without_network() {
        let transport = HttpTransport::new(&quick_config()).unwrap();
        transport.breaker().trip();
        let err = transport.get_bytes("http://127.0.0.1:9/never").unwrap_err();
        assert!(matches!(err, DataError::CircuitBreakerTripped));
    }

    #[test]
    fn refused_connection_is_fetch_failure() {
        let transport = HttpTransport::new(&quick_config()).unwrap();
        let err = transport.get_bytes("http://127.0.0.1:1/").unwrap_err();
        assert!(err.is_fetch_failure(), "unexpected error: {err}");
    }
}
