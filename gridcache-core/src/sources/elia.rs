//! Elia wind and solar forecast services (XML, one request per month).
//!
//! Both services return a list of items, each with a `StartsOn` timestamp
//! and one element per forecast series. The services report `-50` where no
//! value is available; that code is turned into `NaN` here.

use super::markup::{elements, first_element, first_text};
use super::{fetch_text, SourceAdapter};
use crate::error::DataError;
use crate::table::Table;
use crate::transport::Transport;
use chrono::NaiveDateTime;
use std::sync::Arc;

/// Vendor code for "no value available".
pub const UNAVAILABLE_CODE: f64 = -50.0;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastKind {
    Solar,
    Wind,
}

impl ForecastKind {
    fn item_tag(self) -> &'static str {
        match self {
            ForecastKind::Solar => "SolarForecastingChartDataForZoneItem",
            ForecastKind::Wind => "WindForecastingGraphItem",
        }
    }

    /// Series extracted per item, in column order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            ForecastKind::Solar => &[
                "DayAheadForecast",
                "WeekAheadForecast",
                "MonitoredCapacity",
                "LoadFactor",
                "MostRecentForecast",
            ],
            ForecastKind::Wind => &[
                "DayAheadForecast",
                "DayAheadConfidence10",
                "DayAheadConfidence90",
                "WeekAheadConfidence10",
                "WeekAheadConfidence90",
                "MonitoredCapacity",
                "LoadFactor",
                "MostRecentForecast",
                "Realtime",
            ],
        }
    }
}

pub struct EliaForecastAdapter {
    kind: ForecastKind,
    transport: Arc<dyn Transport>,
}

impl EliaForecastAdapter {
    pub fn new(kind: ForecastKind, transport: Arc<dyn Transport>) -> Self {
        Self { kind, transport }
    }

    pub fn kind(&self) -> ForecastKind {
        self.kind
    }

    /// Parse one XML response.
    ///
    /// An element that is present but empty (or `nil`) is `NaN`; a missing
    /// element is a parse error.
    pub fn parse(kind: ForecastKind, source_id: &str, xml: &str) -> Result<Table, DataError> {
        let columns = kind.columns();
        let mut table = Table::new(columns.iter().copied())?;

        for item in elements(xml, kind.item_tag()) {
            let body = item.inner.unwrap_or("");

            let starts_on = first_element(body, "StartsOn")
                .and_then(|el| el.inner)
                .and_then(first_text)
                .ok_or_else(|| DataError::parse(source_id, "item without StartsOn"))?;
            let ts = NaiveDateTime::parse_from_str(starts_on, TIMESTAMP_FORMAT).map_err(|e| {
                DataError::parse(source_id, format!("bad StartsOn '{starts_on}': {e}"))
            })?;

            let mut values = Vec::with_capacity(columns.len());
            for name in columns {
                let el = first_element(body, name).ok_or_else(|| {
                    DataError::parse(source_id, format!("item at {ts} has no {name}"))
                })?;
                let text = el.text();
                let value = if text.is_empty() {
                    f64::NAN
                } else {
                    text.parse::<f64>().map_err(|e| {
                        DataError::parse(source_id, format!("{name} at {ts}: '{text}': {e}"))
                    })?
                };
                values.push(value);
            }
            table.insert(ts, values)?;
        }

        table.replace_sentinel(UNAVAILABLE_CODE);
        Ok(table)
    }
}

impl SourceAdapter for EliaForecastAdapter {
    fn name(&self) -> &str {
        match self.kind {
            ForecastKind::Solar => "elia_solar",
            ForecastKind::Wind => "elia_wind",
        }
    }

    fn fetch_and_parse(&self, source_id: &str) -> Result<Table, DataError> {
        let xml = fetch_text(self.transport.as_ref(), source_id)?;
        Self::parse(self.kind, source_id, &xml)
    }
}
