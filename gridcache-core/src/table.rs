//! Timestamp-indexed table of named `f64` columns.
//!
//! The unit of data interchange between adapters, the orchestrator and the
//! cache store. Rows are kept sorted ascending by timestamp with unique
//! timestamps; inserting an existing timestamp overwrites that row.
//! `NaN` marks an unavailable value.

use crate::error::DataError;
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use std::collections::{BTreeMap, HashSet};

/// Name of the index column in the Polars representation.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: BTreeMap<NaiveDateTime, Vec<f64>>,
}

impl Table {
    /// Create an empty table with the given column names.
    pub fn new<I, S>(columns: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(DataError::Shape(format!("duplicate column '{name}'")));
            }
        }
        Ok(Self {
            columns,
            rows: BTreeMap::new(),
        })
    }

    /// Build a table from rows in any order. Later duplicates win.
    pub fn from_rows<I, S, R>(columns: I, rows: R) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        R: IntoIterator<Item = (NaiveDateTime, Vec<f64>)>,
    {
        let mut table = Self::new(columns)?;
        for (ts, values) in rows {
            table.insert(ts, values)?;
        }
        Ok(table)
    }

    /// Insert a row, returning the previous values at that timestamp if any.
    pub fn insert(
        &mut self,
        ts: NaiveDateTime,
        values: Vec<f64>,
    ) -> Result<Option<Vec<f64>>, DataError> {
        if values.len() != self.columns.len() {
            return Err(DataError::Shape(format!(
                "row at {ts} has {} values, table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        Ok(self.rows.insert(ts, values))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.keys().next().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.keys().next_back().copied()
    }

    /// Freshness check: the last row is at or after `required`.
    ///
    /// An empty table covers nothing.
    pub fn covers(&self, required: NaiveDateTime) -> bool {
        self.last_timestamp().is_some_and(|last| last >= required)
    }

    pub fn get(&self, ts: NaiveDateTime) -> Option<&[f64]> {
        self.rows.get(&ts).map(Vec::as_slice)
    }

    /// Rows in ascending timestamp order.
    pub fn rows(&self) -> impl Iterator<Item = (NaiveDateTime, &[f64])> + '_ {
        self.rows.iter().map(|(ts, values)| (*ts, values.as_slice()))
    }

    pub fn timestamps(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.rows.keys().copied()
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.values().map(|row| row[idx]).collect())
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Row-wise union of `existing` and `fresh`; `fresh` wins on shared timestamps.
    ///
    /// The result carries the union of both column sets (existing's order,
    /// then columns only `fresh` has). Cells a side doesn't provide are `NaN`.
    pub fn merge(existing: &Table, fresh: &Table) -> Table {
        let mut columns = existing.columns.clone();
        for name in &fresh.columns {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }

        let mut rows = BTreeMap::new();
        for side in [existing, fresh] {
            let mapping: Vec<usize> = side
                .columns
                .iter()
                .filter_map(|name| columns.iter().position(|c| c == name))
                .collect();
            for (ts, values) in &side.rows {
                let mut row = vec![f64::NAN; columns.len()];
                for (src, &dst) in mapping.iter().enumerate() {
                    row[dst] = values[src];
                }
                rows.insert(*ts, row);
            }
        }

        Table { columns, rows }
    }

    /// Concatenate tables in order; a later table wins on a shared timestamp.
    pub fn concat<I>(tables: I) -> Table
    where
        I: IntoIterator<Item = Table>,
    {
        tables
            .into_iter()
            .fold(Table::default(), |acc, next| Table::merge(&acc, &next))
    }

    /// Replace a vendor "unavailable" code with `NaN`. Returns the number of cells replaced.
    pub fn replace_sentinel(&mut self, code: f64) -> usize {
        let mut replaced = 0;
        for values in self.rows.values_mut() {
            for v in values.iter_mut() {
                if *v == code {
                    *v = f64::NAN;
                    replaced += 1;
                }
            }
        }
        replaced
    }

    /// BLAKE3 digest over column names, timestamps and value bits.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.columns.len() as u64).to_le_bytes());
        for name in &self.columns {
            hasher.update(&(name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
        }
        for (ts, values) in &self.rows {
            let utc = ts.and_utc();
            hasher.update(&utc.timestamp().to_le_bytes());
            hasher.update(&utc.timestamp_subsec_nanos().to_le_bytes());
            for v in values {
                hasher.update(&canonical_bits(*v).to_le_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    // ── Polars interop ──────────────────────────────────────────────

    /// Convert to a DataFrame: `timestamp` (Datetime[ms]) then one Float64 column per table column.
    ///
    /// Sub-millisecond precision is dropped.
    pub fn to_dataframe(&self) -> Result<DataFrame, DataError> {
        let map_err = |e: PolarsError| DataError::Shape(format!("dataframe build: {e}"));

        let millis: Vec<i64> = self
            .rows
            .keys()
            .map(|ts| ts.and_utc().timestamp_millis())
            .collect();

        let mut cols = Vec::with_capacity(self.columns.len() + 1);
        cols.push(
            Column::new(TIMESTAMP_COLUMN.into(), millis)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .map_err(map_err)?,
        );
        for (idx, name) in self.columns.iter().enumerate() {
            let values: Vec<f64> = self.rows.values().map(|row| row[idx]).collect();
            cols.push(Column::new(name.as_str().into(), values));
        }

        DataFrame::new(cols).map_err(map_err)
    }

    /// Build a table from a DataFrame with a `timestamp` column; other columns become values.
    ///
    /// Nulls become `NaN`; duplicate timestamps keep the last row.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self, DataError> {
        let map_err = |e: PolarsError| DataError::Shape(format!("dataframe read: {e}"));

        let ts_col = df
            .column(TIMESTAMP_COLUMN)
            .map_err(map_err)?
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(map_err)?
            .cast(&DataType::Int64)
            .map_err(map_err)?;
        let ts_ca = ts_col.i64().map_err(map_err)?;

        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != TIMESTAMP_COLUMN)
            .map(|name| name.to_string())
            .collect();

        let mut value_cols = Vec::with_capacity(names.len());
        for name in &names {
            let col = df
                .column(name)
                .map_err(map_err)?
                .cast(&DataType::Float64)
                .map_err(map_err)?;
            value_cols.push(col);
        }
        let value_cas = value_cols
            .iter()
            .map(|c| c.f64().map_err(map_err))
            .collect::<Result<Vec<_>, _>>()?;

        let mut table = Table::new(names)?;
        for i in 0..df.height() {
            let millis = ts_ca
                .get(i)
                .ok_or_else(|| DataError::Shape(format!("null timestamp at row {i}")))?;
            let ts = DateTime::from_timestamp_millis(millis)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| DataError::Shape(format!("timestamp out of range: {millis}")))?;
            let values = value_cas
                .iter()
                .map(|ca| ca.get(i).unwrap_or(f64::NAN))
                .collect();
            table.insert(ts, values)?;
        }
        Ok(table)
    }
}

/// `NaN == NaN` for table equality; everything else compares bitwise-equal values.
impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
            && self.rows.len() == other.rows.len()
            && self
                .rows
                .iter()
                .zip(other.rows.iter())
                .all(|((ta, va), (tb, vb))| {
                    ta == tb
                        && va.len() == vb.len()
                        && va
                            .iter()
                            .zip(vb)
                            .all(|(a, b)| canonical_bits(*a) == canonical_bits(*b))
                })
    }
}

fn canonical_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}
