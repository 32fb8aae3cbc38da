//! Single-file cache store.
//!
//! Layout of the backing file (JSON):
//!
//! ```text
//! {
//!   "format_version": 1,
//!   "next_key": 3,
//!   "registry": [{ "key": 0, "source_id": "http://..." }, ...],
//!   "datasets": { "df0": { "columns": [...], "index": [...], "values": [[...]], "hash": "..." } }
//! }
//! ```
//!
//! Features:
//! - Lazy access: every operation is open → read/write → close
//! - Atomic writes (write to a temp sibling, rename into place)
//! - Stable keys: assigned once per source identifier, never reused
//! - Integrity check on read (BLAKE3 content hash per dataset)
//! - Optional seed bootstrap when the file does not exist yet

use crate::config::StoreConfig;
use crate::error::DataError;
use crate::table::Table;
use crate::transport::Transport;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FORMAT_VERSION: u32 = 1;

/// One registered source identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub key: u64,
    pub source_id: String,
}

/// Summary of one cached dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStatus {
    pub key: u64,
    pub source_id: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
}

/// Name under which the table for `key` is stored.
pub fn dataset_name(key: u64) -> String {
    format!("df{key}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    format_version: u32,
    #[serde(default)]
    next_key: u64,
    registry: Vec<RegistryEntry>,
    datasets: BTreeMap<String, StoredTable>,
}

impl Default for CacheFile {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            next_key: 0,
            registry: Vec::new(),
            datasets: BTreeMap::new(),
        }
    }
}

impl CacheFile {
    fn parse(bytes: &[u8]) -> Result<Self, String> {
        let file: CacheFile = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        if file.format_version != FORMAT_VERSION {
            return Err(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                file.format_version
            ));
        }
        Ok(file)
    }

    fn entry(&self, source_id: &str) -> Option<&RegistryEntry> {
        self.registry.iter().find(|e| e.source_id == source_id)
    }

    /// Key for `source_id`, registering it if needed.
    fn register(&mut self, source_id: &str) -> u64 {
        if let Some(entry) = self.entry(source_id) {
            return entry.key;
        }
        let key = self
            .registry
            .iter()
            .map(|e| e.key + 1)
            .max()
            .unwrap_or(0)
            .max(self.next_key);
        self.registry.push(RegistryEntry {
            key,
            source_id: source_id.to_string(),
        });
        self.next_key = key + 1;
        key
    }
}

/// Column-major table encoding. `NaN` is stored as `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTable {
    columns: Vec<String>,
    index: Vec<NaiveDateTime>,
    values: Vec<Vec<Option<f64>>>,
    hash: String,
}

impl StoredTable {
    fn encode(table: &Table) -> Result<Self, DataError> {
        let mut values = vec![Vec::with_capacity(table.len()); table.columns().len()];
        let mut index = Vec::with_capacity(table.len());
        for (ts, row) in table.rows() {
            index.push(ts);
            for (col, &v) in row.iter().enumerate() {
                if v.is_infinite() {
                    return Err(DataError::Storage(format!(
                        "cannot store non-finite value {v} in column '{}' at {ts}",
                        table.columns()[col]
                    )));
                }
                values[col].push(if v.is_nan() { None } else { Some(v) });
            }
        }
        Ok(Self {
            columns: table.columns().to_vec(),
            index,
            values,
            hash: table.content_hash(),
        })
    }

    fn decode(&self, name: &str) -> Result<Table, DataError> {
        if self.values.len() != self.columns.len()
            || self.values.iter().any(|col| col.len() != self.index.len())
        {
            return Err(DataError::Storage(format!("dataset {name} is malformed")));
        }

        let rows = self.index.iter().enumerate().map(|(i, ts)| {
            let row = self
                .values
                .iter()
                .map(|col| col[i].unwrap_or(f64::NAN))
                .collect();
            (*ts, row)
        });
        let table = Table::from_rows(self.columns.iter().cloned(), rows)
            .map_err(|e| DataError::Storage(format!("dataset {name}: {e}")))?;

        if table.content_hash() != self.hash {
            return Err(DataError::Storage(format!(
                "dataset {name} failed integrity check"
            )));
        }
        Ok(table)
    }
}

/// The cache store. Holds only the path; the file is opened per operation.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    /// A store over `path`. No I/O happens until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the store described by `config`, creating the backing file if absent.
    ///
    /// When the file is missing and a seed URL is configured, the seed
    /// snapshot is downloaded through `transport` and validated before it is
    /// written into place. Without a seed an empty cache is written.
    pub fn open(config: &StoreConfig, transport: &dyn Transport) -> Result<Self, DataError> {
        let store = Self::new(&config.path);
        if store.path.exists() {
            return Ok(store);
        }

        match &config.seed_url {
            Some(url) => {
                info!(
                    url = %url,
                    path = %store.path.display(),
                    "downloading initial cache, this might take a while"
                );
                let bootstrap_err = |reason: String| DataError::BootstrapDownload {
                    url: url.clone(),
                    reason,
                };
                let bytes = transport
                    .get_bytes(url)
                    .map_err(|e| bootstrap_err(e.to_string()))?;
                CacheFile::parse(&bytes)
                    .map_err(|e| bootstrap_err(format!("not a cache snapshot: {e}")))?;
                write_atomic(&store.path, &bytes).map_err(|e| bootstrap_err(e.to_string()))?;
            }
            None => {
                debug!(path = %store.path.display(), "creating empty cache");
                store.write_file(&CacheFile::default())?;
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored table for `source_id`, or `None` if it was never cached.
    pub fn lookup(&self, source_id: &str) -> Result<Option<Table>, DataError> {
        let file = self.read_file()?;
        let Some(entry) = file.entry(source_id) else {
            return Ok(None);
        };
        let name = dataset_name(entry.key);
        let stored = file.datasets.get(&name).ok_or_else(|| {
            DataError::Storage(format!("{source_id} is registered as {name} but has no dataset"))
        })?;
        stored.decode(&name).map(Some)
    }

    /// Overwrite the table stored for `source_id`, registering it first if needed.
    ///
    /// Returns the identifier's key.
    pub fn upsert(&self, source_id: &str, table: &Table) -> Result<u64, DataError> {
        let stored = StoredTable::encode(table)?;
        let mut file = self.read_file()?;
        let key = file.register(source_id);
        file.datasets.insert(dataset_name(key), stored);
        self.write_file(&file)?;
        debug!(source_id, key, rows = table.len(), "cache write");
        Ok(key)
    }

    pub fn key_of(&self, source_id: &str) -> Result<Option<u64>, DataError> {
        Ok(self.read_file()?.entry(source_id).map(|e| e.key))
    }

    /// All registry entries in registration order.
    pub fn entries(&self) -> Result<Vec<RegistryEntry>, DataError> {
        Ok(self.read_file()?.registry)
    }

    /// Per-entry summary without decoding the tables.
    pub fn status(&self) -> Result<Vec<DatasetStatus>, DataError> {
        let file = self.read_file()?;
        Ok(file
            .registry
            .iter()
            .map(|entry| {
                let stored = file.datasets.get(&dataset_name(entry.key));
                DatasetStatus {
                    key: entry.key,
                    source_id: entry.source_id.clone(),
                    rows: stored.map_or(0, |s| s.index.len()),
                    columns: stored.map(|s| s.columns.clone()).unwrap_or_default(),
                    first: stored.and_then(|s| s.index.first().copied()),
                    last: stored.and_then(|s| s.index.last().copied()),
                }
            })
            .collect())
    }

    fn read_file(&self) -> Result<CacheFile, DataError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CacheFile::default()),
            Err(e) => {
                return Err(DataError::Storage(format!(
                    "read {}: {e}",
                    self.path.display()
                )))
            }
        };
        CacheFile::parse(&bytes)
            .map_err(|e| DataError::Storage(format!("corrupt cache {}: {e}", self.path.display())))
    }

    fn write_file(&self, file: &CacheFile) -> Result<(), DataError> {
        let bytes = serde_json::to_vec(file)
            .map_err(|e| DataError::Storage(format!("serialize cache: {e}")))?;
        write_atomic(&self.path, &bytes)
    }
}

/// Write `bytes` to a temp sibling of `path`, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DataError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| DataError::Storage(format!("create dir {}: {e}", parent.display())))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cache".to_string());
    let tmp_path = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    let written = fs::File::create(&tmp_path).and_then(|mut f| {
        f.write_all(bytes)?;
        f.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(DataError::Storage(format!(
            "write {}: {e}",
            tmp_path.display()
        )));
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::Storage(format!("atomic rename failed: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample() -> Table {
        Table::from_rows(
            ["DayAheadForecast", "Realtime"],
            [(ts(1), vec![10.5, f64::NAN]), (ts(2), vec![-0.0, 3.25])],
        )
        .unwrap()
    }

    struct SeedTransport {
        body: Result<Vec<u8>, String>,
        calls: AtomicUsize,
    }

    impl SeedTransport {
        fn new(body: Result<Vec<u8>, String>) -> Self {
            Self {
                body,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Transport for SeedTransport {
        fn get_bytes(&self, url: &str) -> Result<Vec<u8>, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.body.clone().map_err(|reason| DataError::fetch(url, reason))
        }
    }

    #[test]
    fn unknown_source_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache.json"));
        assert!(store.lookup("http://nowhere").unwrap().is_none());
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn upsert_then_lookup_roundtrips_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache.json"));

        store.upsert("http://a", &sample()).unwrap();
        let loaded = store.lookup("http://a").unwrap().unwrap();
        assert_eq!(loaded, sample());
        assert!(loaded.get(ts(1)).unwrap()[1].is_nan());
        assert!(loaded.get(ts(2)).unwrap()[0].is_sign_negative());
    }

    #[test]
    fn keys_are_stable_and_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache.json"));

        let a = store.upsert("http://a", &sample()).unwrap();
        let b = store.upsert("http://b", &sample()).unwrap();
        let a_again = store.upsert("http://a", &Table::default()).unwrap();

        assert_eq!((a, b, a_again), (0, 1, 0));
        assert_eq!(store.key_of("http://b").unwrap(), Some(1));
        assert_eq!(store.lookup("http://a").unwrap().unwrap(), Table::default());
    }

    #[test]
    fn survives_reopen_and_external_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cache.json");
        let writer = CacheStore::new(&path);
        let reader = CacheStore::new(&path);

        writer.upsert("http://a", &sample()).unwrap();
        assert_eq!(reader.lookup("http://a").unwrap().unwrap(), sample());

        reader.upsert("http://b", &sample()).unwrap();
        assert_eq!(writer.key_of("http://b").unwrap(), Some(1));
        assert_eq!(CacheStore::new(&path).entries().unwrap().len(), 2);
    }

    #[test]
    fn status_summarizes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache.json"));
        store.upsert("http://a", &sample()).unwrap();

        let status = store.status().unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].rows, 2);
        assert_eq!(status[0].first, Some(ts(1)));
        assert_eq!(status[0].last, Some(ts(2)));
    }

    #[test]
    fn corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, b"{not json").unwrap();
        let store = CacheStore::new(&path);
        assert!(matches!(store.lookup("x"), Err(DataError::Storage(_))));
        assert!(matches!(store.upsert("x", &sample()), Err(DataError::Storage(_))));
    }

    #[test]
    fn tampered_dataset_fails_integrity_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = CacheStore::new(&path);
        store.upsert("http://a", &sample()).unwrap();

        let text = fs::read_to_string(&path).unwrap().replace("10.5", "11.5");
        fs::write(&path, text).unwrap();

        assert!(matches!(store.lookup("http://a"), Err(DataError::Storage(_))));
    }

    #[test]
    fn infinite_values_are_rejected_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache.json"));
        let table = Table::from_rows(["v"], [(ts(1), vec![f64::INFINITY])]).unwrap();

        assert!(matches!(store.upsert("http://a", &table), Err(DataError::Storage(_))));
        assert!(store.key_of("http://a").unwrap().is_none());
    }

    #[test]
    fn open_without_seed_creates_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            path: dir.path().join("cache.json"),
            seed_url: None,
        };
        let transport = SeedTransport::new(Err("unused".into()));

        let store = CacheStore::open(&config, &transport).unwrap();
        assert!(store.path().exists());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn open_downloads_seed_only_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let seed_dir = tempfile::tempdir().unwrap();
        let seed_store = CacheStore::new(seed_dir.path().join("seed.json"));
        seed_store.upsert("http://seeded", &sample()).unwrap();
        let seed_bytes = fs::read(seed_store.path()).unwrap();

        let config = StoreConfig {
            path: dir.path().join("cache.json"),
            seed_url: Some("https://example.org/seed.json".into()),
        };
        let transport = SeedTransport::new(Ok(seed_bytes));

        let store = CacheStore::open(&config, &transport).unwrap();
        assert_eq!(store.lookup("http://seeded").unwrap().unwrap(), sample());

        CacheStore::open(&config, &transport).unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_seed_download_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            path: dir.path().join("cache.json"),
            seed_url: Some("https://example.org/seed.json".into()),
        };

        let offline = SeedTransport::new(Err("connection refused".into()));
        assert!(matches!(
            CacheStore::open(&config, &offline),
            Err(DataError::BootstrapDownload { .. })
        ));

        let garbage = SeedTransport::new(Ok(b"<html>".to_vec()));
        assert!(matches!(
            CacheStore::open(&config, &garbage),
            Err(DataError::BootstrapDownload { .. })
        ));
        assert!(!config.path.exists());
    }
}
