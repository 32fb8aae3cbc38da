//! Belpex day-ahead spot prices from the Elexys market information page.
//!
//! The page only shows a recent window (about a week), so the dataset is
//! built up by merging every fetch into the cached history. Prices are in
//! Belgian notation: `€ 1.234,56`.

use super::markup::elements;
use super::{fetch_text, SourceAdapter};
use crate::error::DataError;
use crate::table::Table;
use crate::transport::Transport;
use chrono::NaiveDateTime;
use std::sync::Arc;

pub const BELPEX_URL: &str = "https://my.elexys.be/MarketInformation/SpotBelpex.aspx";
pub const PRICE_COLUMN: &str = "price";

const GRID_ID: &str = "contentPlaceHolder_belpexFilterGrid";
/// Title, filter and header rows above the data.
const HEADER_ROWS: usize = 4;
const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

pub struct BelpexAdapter {
    transport: Arc<dyn Transport>,
}

impl BelpexAdapter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Parse a full page (live or saved to disk).
    pub fn parse_page(source_id: &str, html: &str) -> Result<Table, DataError> {
        let grid = elements(html, "table")
            .into_iter()
            .find(|t| t.attr("id") == Some(GRID_ID))
            .and_then(|t| t.inner)
            .ok_or_else(|| DataError::parse(source_id, format!("no table #{GRID_ID}")))?;

        let rows = elements(grid, "tr");
        let mut table = Table::new([PRICE_COLUMN])?;
        if rows.len() <= HEADER_ROWS + 1 {
            return Ok(table);
        }

        // The last row is the pager.
        for row in &rows[HEADER_ROWS..rows.len() - 1] {
            let cells = elements(row.inner.unwrap_or(""), "td");
            let (Some(when), Some(price)) = (cells.first(), cells.get(1)) else {
                return Err(DataError::parse(source_id, "price row with fewer than 2 cells"));
            };

            let when = when.text();
            let ts = NaiveDateTime::parse_from_str(&when, TIMESTAMP_FORMAT)
                .map_err(|e| DataError::parse(source_id, format!("bad timestamp '{when}': {e}")))?;
            let price = parse_euro(&price.text())
                .ok_or_else(|| DataError::parse(source_id, format!("bad price at {ts}")))?;
            table.insert(ts, vec![price])?;
        }
        Ok(table)
    }
}

/// `€ 1.234,56` → `1234.56`.
fn parse_euro(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit() || c == '-')?;
    let number: String = text[start..]
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    number.parse().ok()
}

impl SourceAdapter for BelpexAdapter {
    fn name(&self) -> &str {
        "belpex_spot"
    }

    fn fetch_and_parse(&self, source_id: &str) -> Result<Table, DataError> {
        let html = fetch_text(self.transport.as_ref(), source_id)?;
        Self::parse_page(source_id, &html)
    }
}
