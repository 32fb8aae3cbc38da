//! Elia total load forecast, published as one CSV file per year.
//!
//! Relevant columns: `RowDate` (`dd/mm/yyyy`), `RowTime` (`HH:MM`) and
//! `TotalLoadForecast`. Rows without a value, and rows whose time is not a
//! plain `HH:MM` (the DST duplicates carry a suffix), are dropped.

use super::{fetch_text, SourceAdapter};
use crate::error::DataError;
use crate::table::Table;
use crate::transport::Transport;
use chrono::NaiveDateTime;
use std::sync::Arc;

pub const VALUE_COLUMN: &str = "value";

pub struct LoadForecastAdapter {
    transport: Arc<dyn Transport>,
}

impl LoadForecastAdapter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Parse one yearly CSV file.
    pub fn parse(source_id: &str, csv_text: &str) -> Result<Table, DataError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(csv_text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| DataError::parse(source_id, format!("csv header: {e}")))?
            .clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| DataError::parse(source_id, format!("missing column '{name}'")))
        };
        let date_idx = column("RowDate")?;
        let time_idx = column("RowTime")?;
        let value_idx = column("TotalLoadForecast")?;

        let mut table = Table::new([VALUE_COLUMN])?;
        for (line, record) in reader.records().enumerate() {
            let record =
                record.map_err(|e| DataError::parse(source_id, format!("csv row {line}: {e}")))?;

            let value = match record.get(value_idx).map(str::trim) {
                None | Some("") => continue,
                Some(raw) => raw.parse::<f64>().map_err(|e| {
                    DataError::parse(source_id, format!("row {line}: bad value '{raw}': {e}"))
                })?,
            };
            if value.is_nan() {
                continue;
            }

            let time = record.get(time_idx).unwrap_or("");
            if time.len() != 5 {
                continue;
            }
            let date = record.get(date_idx).unwrap_or("");
            let ts = NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%d/%m/%Y%H:%M")
                .map_err(|e| {
                    DataError::parse(
                        source_id,
                        format!("row {line}: bad timestamp '{date} {time}': {e}"),
                    )
                })?;

            table.insert(ts, vec![value])?;
        }
        Ok(table)
    }
}

impl SourceAdapter for LoadForecastAdapter {
    fn name(&self) -> &str {
        "elia_load_forecast"
    }

    fn fetch_and_parse(&self, source_id: &str) -> Result<Table, DataError> {
        let text = fetch_text(self.transport.as_ref(), source_id)?;
        Self::parse(source_id, &text)
    }
}
