//! Source adapters: per-vendor "fetch raw bytes, parse into a Table".
//!
//! The orchestrator only sees the `SourceAdapter` trait. Each vendor format
//! lives in its own module and reaches the network through an injected
//! `Transport`, so tests can swap in canned payloads.

pub mod belpex;
pub mod elia;
pub mod load_forecast;
pub(crate) mod markup;

pub use belpex::BelpexAdapter;
pub use elia::{EliaForecastAdapter, ForecastKind};
pub use load_forecast::LoadForecastAdapter;

use crate::error::DataError;
use crate::table::Table;
use crate::transport::Transport;

/// Capability consumed by the orchestrator.
pub trait SourceAdapter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetch `source_id` (a URL) and parse it into a table.
    ///
    /// Transport failures surface as fetch errors, malformed payloads as `Parse`.
    fn fetch_and_parse(&self, source_id: &str) -> Result<Table, DataError>;
}

/// Body of `source_id` as text. Invalid UTF-8 is replaced rather than rejected.
pub(crate) fn fetch_text(transport: &dyn Transport, source_id: &str) -> Result<String, DataError> {
    let bytes = transport.get_bytes(source_id)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
