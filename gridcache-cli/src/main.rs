//! gridcache CLI: fetch, import, gap report and cache management commands.
//!
//! Commands:
//! - `fetch`: fetch a dataset through the cache, optionally export it
//! - `import-belpex`: merge a saved Belpex page into the cached prices
//! - `gaps`: report missing points of a cached dataset, per year
//! - `cache status`: list cached identifiers with row counts and ranges

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand};
use gridcache_core::diagnostics::missing_points;
use gridcache_core::transport::{HttpTransport, Transport};
use gridcache_core::{
    fetch_dataset, import_page, load_cached, CacheStore, Dataset, FetchRange, Fetcher,
    GridcacheConfig, SystemClock, Table,
};
use polars::prelude::{CsvWriter, ParquetWriter, SerWriter};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gridcache",
    version,
    about = "gridcache: Belgian grid forecasts and spot prices behind a local cache"
)]
struct Cli {
    /// TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache file. Overrides the config file.
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Log every cache decision.
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    /// Never touch the network; serve whatever is cached.
    #[arg(long, global = true, default_value_t = false)]
    cache_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a dataset: load_forecast, solar, wind or belpex.
    Fetch {
        dataset: Dataset,

        /// Start date (YYYY-MM-DD). Defaults to the start of the published history.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to now.
        #[arg(long)]
        end: Option<String>,

        /// Write the result to this file: Parquet for `.parquet`, CSV otherwise.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Merge a Belpex page saved from a browser into the cached prices.
    ImportBelpex {
        /// Saved HTML page.
        page: PathBuf,
    },
    /// Report missing points of a cached dataset (no network access).
    Gaps { dataset: Dataset },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached identifiers with their key, row count and date range.
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Fetch {
            dataset,
            start,
            end,
            out,
        } => run_fetch(&config, dataset, start, end, out),
        Commands::ImportBelpex { page } => run_import(&config, &page),
        Commands::Gaps { dataset } => run_gaps(&config, dataset),
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(&config),
        },
    }
}

/// `RUST_LOG` wins; otherwise `info` with `--verbose`, `warn` without.
fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<GridcacheConfig> {
    let mut config = match &cli.config {
        Some(path) => GridcacheConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => GridcacheConfig::default(),
    };
    if let Some(cache) = &cli.cache {
        config.store.path = cache.clone();
    }
    config.fetch.verbose |= cli.verbose;
    config.fetch.cache_only |= cli.cache_only;
    Ok(config)
}

fn build_fetcher(config: &GridcacheConfig, dataset: Dataset) -> Result<Fetcher> {
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(&config.http).context("Failed to build HTTP client")?);
    let store = CacheStore::open(&config.store, transport.as_ref())
        .with_context(|| format!("Failed to open cache {}", config.store.path.display()))?;
    Ok(dataset.fetcher(store, transport, config.fetch))
}

fn parse_date(arg: Option<&str>) -> Result<Option<NaiveDateTime>> {
    arg.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD"))
            .map(|d| d.and_time(NaiveTime::default()))
    })
    .transpose()
}

fn run_fetch(
    config: &GridcacheConfig,
    dataset: Dataset,
    start: Option<String>,
    end: Option<String>,
    out: Option<PathBuf>,
) -> Result<()> {
    let range = FetchRange {
        start: parse_date(start.as_deref())?,
        end: parse_date(end.as_deref())?,
    };
    let fetcher = build_fetcher(config, dataset)?;
    let table = fetch_dataset(&fetcher, dataset, range, &SystemClock)
        .with_context(|| format!("Failed to fetch {dataset}"))?;

    print_summary(dataset, &table);
    if let Some(path) = out {
        export(&table, &path)?;
        println!("Written:  {}", path.display());
    }
    Ok(())
}

fn run_import(config: &GridcacheConfig, page: &Path) -> Result<()> {
    let fetcher = build_fetcher(config, Dataset::Belpex)?;
    let merged = import_page(&fetcher, page)
        .with_context(|| format!("Failed to import {}", page.display()))?;
    println!("Imported {} into the Belpex history.", page.display());
    print_summary(Dataset::Belpex, &merged);
    Ok(())
}

fn run_gaps(config: &GridcacheConfig, dataset: Dataset) -> Result<()> {
    let fetcher = build_fetcher(config, dataset)?;
    let table = load_cached(&fetcher, dataset, &SystemClock)
        .with_context(|| format!("Failed to load cached {dataset}"))?;

    let Some(report) = missing_points(&table) else {
        println!("{dataset}: fewer than two rows cached, nothing to analyse.");
        return Ok(());
    };

    println!("Dataset:  {dataset}");
    println!("Step:     {} min", report.step.num_minutes());
    println!(
        "Points:   {} present of {} expected ({} missing)",
        report.present(),
        report.expected,
        report.missing.len()
    );
    println!();
    println!("{:<6} {:>10}", "Year", "Missing");
    println!("{}", "-".repeat(17));
    for (year, missing) in &report.missing_per_year {
        println!("{:<6} {:>10}", year, missing);
    }
    Ok(())
}

fn run_cache_status(config: &GridcacheConfig) -> Result<()> {
    let path = &config.store.path;
    if !path.exists() {
        println!("Cache file does not exist: {}", path.display());
        return Ok(());
    }

    let store = CacheStore::new(path);
    let status = store
        .status()
        .with_context(|| format!("Failed to read cache {}", path.display()))?;
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    println!("Cache: {}", path.display());
    println!("Datasets: {}", status.len());
    println!("Total size: {}", format_size(size));
    println!();
    println!("{:<5} {:>8} {:<35} Source", "Key", "Rows", "Range");
    println!("{}", "-".repeat(80));
    for entry in &status {
        let range = match (entry.first, entry.last) {
            (Some(first), Some(last)) => format!(
                "{} to {}",
                first.format("%Y-%m-%d %H:%M"),
                last.format("%Y-%m-%d %H:%M")
            ),
            _ => "empty".to_string(),
        };
        println!("{:<5} {:>8} {:<35} {}", entry.key, entry.rows, range, entry.source_id);
    }
    Ok(())
}

fn export(table: &Table, path: &Path) -> Result<()> {
    let mut df = table.to_dataframe().context("Failed to build dataframe")?;
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext == "parquet") {
        ParquetWriter::new(&mut file)
            .finish(&mut df)
            .context("Failed to write parquet")?;
    } else {
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .context("Failed to write csv")?;
    }
    info!(path = %path.display(), rows = table.len(), "exported");
    Ok(())
}

fn print_summary(dataset: Dataset, table: &Table) {
    println!();
    println!("=== {dataset} ===");
    println!("Rows:     {}", table.len());
    println!("Columns:  {}", table.columns().join(", "));
    match (table.first_timestamp(), table.last_timestamp()) {
        (Some(first), Some(last)) => println!("Range:    {first} to {last}"),
        _ => println!("Range:    (empty)"),
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
