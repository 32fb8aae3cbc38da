//! Missing-point analysis for cached series.

use crate::table::Table;
use chrono::{Datelike, Duration, NaiveDateTime};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct GapReport {
    /// Sampling step: the smallest positive spacing between consecutive rows.
    pub step: Duration,
    /// Points on the regular grid from first to last timestamp.
    pub expected: usize,
    pub missing: Vec<NaiveDateTime>,
    /// Missing count per calendar year, every year of the grid included.
    pub missing_per_year: BTreeMap<i32, usize>,
}

impl GapReport {
    pub fn present(&self) -> usize {
        self.expected - self.missing.len()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compare `table` with a regular grid at its own sampling step.
///
/// Returns `None` for tables with fewer than two rows. Timestamps off the
/// grid are ignored.
pub fn missing_points(table: &Table) -> Option<GapReport> {
    let timestamps: Vec<NaiveDateTime> = table.timestamps().collect();
    let step = timestamps.windows(2).map(|w| w[1] - w[0]).min()?;
    let first = *timestamps.first()?;
    let last = *timestamps.last()?;

    let mut expected = 0;
    let mut missing = Vec::new();
    let mut missing_per_year = BTreeMap::new();
    let mut present = timestamps.iter().peekable();
    let mut ts = first;

    while ts <= last {
        expected += 1;
        let counter = missing_per_year.entry(ts.year()).or_insert(0);

        while present.next_if(|t| **t < ts).is_some() {}
        if present.next_if(|t| **t == ts).is_none() {
            missing.push(ts);
            *counter += 1;
        }
        ts += step;
    }

    Some(GapReport {
        step,
        expected,
        missing,
        missing_per_year,
    })
}
