//! Fetch orchestrator: decides cache hit, stale or miss, and writes back.
//!
//! Policy for `get`:
//! 1. If the cache may be used and holds a table covering the requested
//!    timestamp → return it, no network
//! 2. If network access is disabled → serve whatever is cached (stale
//!    included), or fail with `NotCached`
//! 3. Otherwise → fetch through the adapter, overwrite the cache entry, return
//!
//! Rolling-window sources merge each fetch into the cached history instead of
//! overwriting it; calendar-partitioned sources are fetched one segment at a
//! time with only the still-open segment refetched.

use crate::clock::Clock;
use crate::config::FetchOptions;
use crate::error::DataError;
use crate::segment::{segments, SegmentPlan};
use crate::sources::SourceAdapter;
use crate::store::CacheStore;
use crate::table::Table;
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, info};

/// Emit a cache decision at `info` when verbose, `debug` otherwise.
macro_rules! decision {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            info!($($arg)+);
        } else {
            debug!($($arg)+);
        }
    };
}

pub struct Fetcher {
    store: CacheStore,
    adapter: Arc<dyn SourceAdapter>,
    options: FetchOptions,
}

impl Fetcher {
    pub fn new(store: CacheStore, adapter: Arc<dyn SourceAdapter>, options: FetchOptions) -> Self {
        Self {
            store,
            adapter,
            options,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn options(&self) -> FetchOptions {
        self.options
    }

    /// Table for `source_id`, from cache when allowed and fresh enough.
    ///
    /// A failed fetch leaves the cache untouched.
    pub fn get(
        &self,
        source_id: &str,
        allow_cache: bool,
        required_coverage: Option<NaiveDateTime>,
    ) -> Result<Table, DataError> {
        let verbose = self.options.verbose;

        let cached = if allow_cache || self.options.cache_only {
            self.store.lookup(source_id)?
        } else {
            None
        };

        let is_fresh =
            |table: &Table| required_coverage.map_or(true, |required| table.covers(required));
        let cached = match cached {
            Some(table) if allow_cache && is_fresh(&table) => {
                decision!(verbose, source_id, rows = table.len(), "loaded from cache");
                return Ok(table);
            }
            other => other,
        };

        if allow_cache {
            if let Some(table) = &cached {
                decision!(
                    verbose,
                    source_id,
                    last = ?table.last_timestamp(),
                    required = ?required_coverage,
                    "cached data is stale"
                );
            }
        }

        if self.options.cache_only {
            return match cached {
                Some(table) => {
                    decision!(verbose, source_id, "serving cached data without network access");
                    Ok(table)
                }
                None => Err(DataError::NotCached {
                    source_id: source_id.to_string(),
                }),
            };
        }

        decision!(verbose, source_id, adapter = self.adapter.name(), "fetching url");
        let fresh = self.adapter.fetch_and_parse(source_id)?;
        self.store.upsert(source_id, &fresh)?;
        Ok(fresh)
    }

    /// Merge `fresh` into the cached table for `source_id` and store the result.
    ///
    /// Fresh rows win on shared timestamps; cached rows outside `fresh` are kept.
    pub fn merge_into_cache(&self, source_id: &str, fresh: &Table) -> Result<Table, DataError> {
        let merged = match self.store.lookup(source_id)? {
            Some(existing) => Table::merge(&existing, fresh),
            None => fresh.clone(),
        };
        decision!(
            self.options.verbose,
            source_id,
            fresh_rows = fresh.len(),
            total_rows = merged.len(),
            "merged into cache"
        );
        self.store.upsert(source_id, &merged)?;
        Ok(merged)
    }

    /// Fetch a rolling-window source and accumulate it into the cached history.
    pub fn fetch_rolling(&self, source_id: &str) -> Result<Table, DataError> {
        if self.options.cache_only {
            return self.get(source_id, true, None);
        }
        decision!(self.options.verbose, source_id, adapter = self.adapter.name(), "fetching url");
        let fresh = self.adapter.fetch_and_parse(source_id)?;
        self.merge_into_cache(source_id, &fresh)
    }

    /// Fetch every calendar segment of `plan` overlapping `[start, end]`.
    ///
    /// `now` is read once. Elapsed segments are served from cache when their
    /// cached copy reaches `segment.end - coverage_margin`; the open segment
    /// is always refetched. Segments run in increasing time order and the
    /// first failure aborts the call.
    pub fn fetch_segmented(
        &self,
        plan: &SegmentPlan,
        start: NaiveDateTime,
        end: NaiveDateTime,
        clock: &dyn Clock,
    ) -> Result<Table, DataError> {
        let now = clock.now();
        let mut parts = Vec::new();

        for segment in segments(plan.period, start, end) {
            let source_id = plan.source_id(&segment);
            let allow_cache = !segment.is_open(now, plan.open_grace);
            let table = self.get(&source_id, allow_cache, Some(plan.required_coverage(&segment)))?;
            parts.push(table);
        }

        Ok(Table::concat(parts))
    }
}
