//! The four published datasets and how each one is fetched.
//!
//! Load forecast, solar and wind are calendar-partitioned on the Elia
//! publication server; Belpex is a rolling window accumulated in the cache.

use crate::clock::Clock;
use crate::config::FetchOptions;
use crate::error::DataError;
use crate::orchestrator::Fetcher;
use crate::segment::{segments, SegmentPeriod, SegmentPlan};
use crate::sources::belpex::BELPEX_URL;
use crate::sources::{
    BelpexAdapter, EliaForecastAdapter, ForecastKind, LoadForecastAdapter, SourceAdapter,
};
use crate::store::CacheStore;
use crate::table::Table;
use crate::transport::Transport;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

const LOAD_FORECAST_URL: &str = r"http://publications.elia.be/Publications/Publications/FileRepository.v1.svc/DownloadFile?filePath=\load_forecast\Total_load_forecast_{year}.csv";
const SOLAR_URL: &str = "http://publications.elia.be/Publications/Publications/SolarForecasting.v4.svc/GetChartDataForZoneXml?dateFrom={start}&dateTo={end}&sourceId=1";
const WIND_URL: &str = "http://publications.elia.be/Publications/Publications/WindForecasting.v2.svc/GetForecastData?beginDate={start}&endDate={end}&isOffshore=&isEliaConnected=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    LoadForecast,
    Solar,
    Wind,
    Belpex,
}

/// How a dataset reaches the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// One source identifier per calendar segment.
    Segmented(SegmentPlan),
    /// A single identifier whose window moves; fetches are merged into history.
    Rolling { source_id: &'static str },
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [
        Dataset::LoadForecast,
        Dataset::Solar,
        Dataset::Wind,
        Dataset::Belpex,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dataset::LoadForecast => "load_forecast",
            Dataset::Solar => "solar",
            Dataset::Wind => "wind",
            Dataset::Belpex => "belpex",
        }
    }

    pub fn strategy(self) -> Strategy {
        let history_start = NaiveDate::from_ymd_opt(2014, 1, 1).unwrap_or_default();
        match self {
            Dataset::LoadForecast => Strategy::Segmented(SegmentPlan {
                period: SegmentPeriod::Year,
                history_start,
                coverage_margin: Duration::minutes(15),
                open_grace: Duration::zero(),
                url_template: LOAD_FORECAST_URL.to_string(),
            }),
            Dataset::Solar | Dataset::Wind => Strategy::Segmented(SegmentPlan {
                period: SegmentPeriod::Month,
                history_start,
                coverage_margin: Duration::hours(3),
                open_grace: Duration::days(1),
                url_template: match self {
                    Dataset::Solar => SOLAR_URL,
                    _ => WIND_URL,
                }
                .to_string(),
            }),
            Dataset::Belpex => Strategy::Rolling {
                source_id: BELPEX_URL,
            },
        }
    }

    pub fn adapter(self, transport: Arc<dyn Transport>) -> Arc<dyn SourceAdapter> {
        match self {
            Dataset::LoadForecast => Arc::new(LoadForecastAdapter::new(transport)),
            Dataset::Solar => Arc::new(EliaForecastAdapter::new(ForecastKind::Solar, transport)),
            Dataset::Wind => Arc::new(EliaForecastAdapter::new(ForecastKind::Wind, transport)),
            Dataset::Belpex => Arc::new(BelpexAdapter::new(transport)),
        }
    }

    /// Fetcher wired to this dataset's adapter.
    pub fn fetcher(
        self,
        store: CacheStore,
        transport: Arc<dyn Transport>,
        options: FetchOptions,
    ) -> Fetcher {
        Fetcher::new(store, self.adapter(transport), options)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Dataset::ALL
            .into_iter()
            .find(|d| d.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = Dataset::ALL.iter().map(|d| d.name()).collect();
                format!("unknown dataset '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// Requested time span; open ends fall back to the dataset's history start
/// and the clock's current time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchRange {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl FetchRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}

/// Fetch `dataset` through `fetcher`, which must carry that dataset's adapter.
///
/// Segmented datasets return every segment overlapping the range (whole
/// segments, not clipped to the range). Rolling datasets ignore the range
/// and return the accumulated history.
pub fn fetch_dataset(
    fetcher: &Fetcher,
    dataset: Dataset,
    range: FetchRange,
    clock: &dyn Clock,
) -> Result<Table, DataError> {
    match dataset.strategy() {
        Strategy::Segmented(plan) => {
            let start = range
                .start
                .or_else(|| plan.history_start.and_hms_opt(0, 0, 0))
                .unwrap_or_default();
            let end = range.end.unwrap_or_else(|| clock.now());
            if end < start {
                return Err(DataError::Shape(format!(
                    "range end {end} is before start {start}"
                )));
            }
            fetcher.fetch_segmented(&plan, start, end, clock)
        }
        Strategy::Rolling { source_id } => fetcher.fetch_rolling(source_id),
    }
}

/// Everything cached for `dataset`, read straight from the store.
///
/// Segments that were never cached are skipped, so a partial history still
/// loads. `NotCached` only when nothing at all is cached.
pub fn load_cached(
    fetcher: &Fetcher,
    dataset: Dataset,
    clock: &dyn Clock,
) -> Result<Table, DataError> {
    let source_ids: Vec<String> = match dataset.strategy() {
        Strategy::Segmented(plan) => {
            let start = plan.history_start.and_hms_opt(0, 0, 0).unwrap_or_default();
            segments(plan.period, start, clock.now())
                .iter()
                .map(|segment| plan.source_id(segment))
                .collect()
        }
        Strategy::Rolling { source_id } => vec![source_id.to_string()],
    };

    let mut parts = Vec::new();
    for source_id in &source_ids {
        match fetcher.store().lookup(source_id)? {
            Some(table) => parts.push(table),
            None => debug!(%source_id, "not cached, skipped"),
        }
    }
    if parts.is_empty() {
        return Err(DataError::NotCached {
            source_id: dataset.name().to_string(),
        });
    }
    Ok(Table::concat(parts))
}

/// Merge a Belpex page saved to disk into the cached price history.
pub fn import_page(fetcher: &Fetcher, path: &Path) -> Result<Table, DataError> {
    let html = std::fs::read_to_string(path)
        .map_err(|e| DataError::Storage(format!("reading {}: {e}", path.display())))?;
    let table = BelpexAdapter::parse_page(BELPEX_URL, &html)?;
    fetcher.merge_into_cache(BELPEX_URL, &table)
}
