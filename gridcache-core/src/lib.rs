//! gridcache core: time-series fetching with a single-file cache keyed by URL.
//!
//! This crate contains:
//! - The timestamp-indexed `Table` shared by every component
//! - A JSON-file cache store with stable integer keys per source identifier
//! - The fetch orchestrator (cache hit / stale / miss, rolling merges,
//!   calendar-segmented fetches)
//! - HTTP transport with retry and circuit breaker
//! - Vendor adapters for Elia load, solar and wind forecasts and Belpex prices
//! - Missing-point diagnostics

pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod datasets;
pub mod diagnostics;
pub mod error;
pub mod orchestrator;
pub mod segment;
pub mod sources;
pub mod store;
pub mod table;
pub mod transport;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{FetchOptions, GridcacheConfig};
pub use datasets::{fetch_dataset, import_page, load_cached, Dataset, FetchRange};
pub use error::DataError;
pub use orchestrator::Fetcher;
pub use store::CacheStore;
pub use table::Table;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: a fetcher and everything it holds can move to a worker thread.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Table>();
        require_sync::<Table>();
        require_send::<CacheStore>();
        require_sync::<CacheStore>();
        require_send::<Fetcher>();
        require_sync::<Fetcher>();
        require_send::<transport::HttpTransport>();
        require_sync::<transport::HttpTransport>();
        require_send::<circuit_breaker::CircuitBreaker>();
        require_sync::<circuit_breaker::CircuitBreaker>();
        require_send::<DataError>();
        require_sync::<DataError>();
    }

    /// The orchestrator only depends on the adapter capability, never on a vendor type.
    #[test]
    fn fetcher_accepts_any_adapter() {
        fn _build(
            store: CacheStore,
            adapter: std::sync::Arc<dyn sources::SourceAdapter>,
        ) -> Fetcher {
            Fetcher::new(store, adapter, FetchOptions::default())
        }
    }
}
