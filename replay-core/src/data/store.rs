//! Parquet candle store with Hive-style partitioning.
//!
//! Layout: `{root}/symbol={SYMBOL}/{year}.parquet`
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Merge on write: new candles replace stored ones with the same timestamp
//! - Integrity validation on load (schema check, row count > 0)
//! - Reads fail on a corrupt partition; writes quarantine it ({filename}.quarantined)
//! - Metadata sidecar per symbol (hash, time range, source)
//! - Range queries that only read the partitions they overlap

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::provider::{BatchSink, CandleQuery, CandleSource, DataError, StreamError, StreamSummary};
use super::validate::{canonicalize, deliver};
use crate::domain::Candle;

/// Default number of candles per streamed batch.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Metadata sidecar for a stored symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub symbol: String,
    pub first_timestamp: u64,
    pub last_timestamp: u64,
    pub candle_count: usize,
    pub data_hash: String,
    pub source: String,
    pub written_at: chrono::NaiveDateTime,
}

/// Store status for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub symbol: String,
    pub stored: bool,
    pub first_timestamp: Option<u64>,
    pub last_timestamp: Option<u64>,
    pub candle_count: Option<usize>,
}

/// The Parquet store.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    root: PathBuf,
    batch_size: usize,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Candles per batch when streaming.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        assert!(batch_size >= 1, "batch size must be at least 1");
        self.batch_size = batch_size;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/symbol={SYMBOL}/`
    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.root.join(format!("symbol={symbol}"))
    }

    /// `{root}/symbol={SYMBOL}/{year}.parquet`
    fn year_path(&self, symbol: &str, year: i32) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join("meta.json")
    }

    /// Merge candles into the store for a symbol.
    ///
    /// Only the year partitions touched by `candles` are rewritten. Within a
    /// partition, incoming candles replace stored ones with the same timestamp.
    pub fn write(
        &self,
        symbol: &str,
        candles: &[Candle],
        source: &str,
    ) -> Result<StoreMeta, DataError> {
        if candles.is_empty() {
            return Err(DataError::StoreError("no candles to store".into()));
        }

        let sym_dir = self.symbol_dir(symbol);
        fs::create_dir_all(&sym_dir)
            .map_err(|e| DataError::StoreError(format!("failed to create dir: {e}")))?;

        let mut by_year: BTreeMap<i32, Vec<Candle>> = BTreeMap::new();
        for candle in candles {
            by_year
                .entry(year_of(candle.timestamp)?)
                .or_default()
                .push(*candle);
        }

        for (year, incoming) in by_year {
            let path = self.year_path(symbol, year);
            let mut merged = if path.exists() {
                load_or_quarantine(&path)
            } else {
                Vec::new()
            };
            merged.extend(incoming);
            let merged = canonicalize(merged);

            let tmp_path = path.with_extension("parquet.tmp");
            write_parquet(&mut candles_to_dataframe(&merged)?, &tmp_path)?;
            fs::rename(&tmp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                DataError::StoreError(format!("atomic rename failed: {e}"))
            })?;
            debug!(symbol, year, rows = merged.len(), "partition written");
        }

        let all = self.load(symbol)?;
        let meta = build_meta(symbol, &all, source)?;
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::StoreError(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(symbol), meta_json)
            .map_err(|e| DataError::StoreError(format!("meta write: {e}")))?;

        info!(
            symbol,
            candles = meta.candle_count,
            first = meta.first_timestamp,
            last = meta.last_timestamp,
            "store updated"
        );
        Ok(meta)
    }

    /// Load all stored candles for a symbol, ascending by timestamp.
    pub fn load(&self, symbol: &str) -> Result<Vec<Candle>, DataError> {
        let all = self.load_years(symbol, i32::MIN, i32::MAX)?;
        if all.is_empty() {
            return Err(DataError::NoStoredData {
                symbol: symbol.to_string(),
            });
        }
        Ok(all)
    }

    /// Load partitions whose year lies in `[first_year, last_year]`.
    ///
    /// Any unreadable partition in range fails the whole load.
    fn load_years(
        &self,
        symbol: &str,
        first_year: i32,
        last_year: i32,
    ) -> Result<Vec<Candle>, DataError> {
        let sym_dir = self.symbol_dir(symbol);
        if !sym_dir.exists() {
            return Err(DataError::NoStoredData {
                symbol: symbol.to_string(),
            });
        }

        let mut all = Vec::new();
        for (year, path) in list_partitions(&sym_dir)? {
            if year < first_year || year > last_year {
                continue;
            }
            let candles = load_and_validate_parquet(&path).map_err(|e| {
                warn!(symbol, year, path = %path.display(), error = %e, "unreadable partition");
                DataError::ParquetError(format!("partition {}: {e}", path.display()))
            })?;
            all.extend(candles);
        }
        all.sort_by_key(|c| c.timestamp);
        Ok(all)
    }

    pub fn get_meta(&self, symbol: &str) -> Option<StoreMeta> {
        let content = fs::read_to_string(self.meta_path(symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Symbols that have a partition directory, sorted.
    pub fn symbols(&self) -> Result<Vec<String>, DataError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root)
            .map_err(|e| DataError::StoreError(format!("read dir: {e}")))?;
        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::StoreError(format!("dir entry: {e}")))?;
            if let Some(sym) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("symbol="))
            {
                symbols.push(sym.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    pub fn status(&self, symbols: &[&str]) -> Vec<StoreStatus> {
        symbols
            .iter()
            .map(|sym| {
                let meta = self.get_meta(sym);
                StoreStatus {
                    symbol: sym.to_string(),
                    stored: meta.is_some(),
                    first_timestamp: meta.as_ref().map(|m| m.first_timestamp),
                    last_timestamp: meta.as_ref().map(|m| m.last_timestamp),
                    candle_count: meta.as_ref().map(|m| m.candle_count),
                }
            })
            .collect()
    }
}

impl CandleSource for ParquetStore {
    fn name(&self) -> &str {
        "parquet"
    }

    fn stream(
        &self,
        query: &CandleQuery,
        sink: &mut BatchSink<'_>,
    ) -> Result<StreamSummary, StreamError> {
        query.validate()?;
        let first_year = year_of(query.start_time)?;
        let last_year = year_of(query.end_time).unwrap_or(i32::MAX);
        let candles = self.load_years(&query.symbol, first_year, last_year)?;
        debug!(
            symbol = %query.symbol,
            loaded = candles.len(),
            first_year,
            last_year,
            "partitions loaded"
        );
        deliver(query, &candles, self.batch_size, sink)
    }

    /// Estimated from the stored range, assuming evenly spaced candles.
    fn len_hint(&self, query: &CandleQuery) -> Option<usize> {
        let meta = self.get_meta(&query.symbol)?;
        let lo = query.start_time.max(meta.first_timestamp);
        let hi = query.end_time.min(meta.last_timestamp);
        if lo > hi {
            return Some(0);
        }
        let span = meta.last_timestamp - meta.first_timestamp;
        if meta.candle_count < 2 || span == 0 {
            return Some(meta.candle_count);
        }
        let step = (span / (meta.candle_count as u64 - 1)).max(1);
        let estimate = usize::try_from((hi - lo) / step + 1).unwrap_or(usize::MAX);
        Some(estimate.min(meta.candle_count))
    }
}

/// Calendar year (UTC) of a millisecond timestamp.
fn year_of(timestamp_ms: u64) -> Result<i32, DataError> {
    i64::try_from(timestamp_ms)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt| dt.year())
        .ok_or_else(|| DataError::InvalidQuery(format!("timestamp {timestamp_ms} out of range")))
}

/// Load a partition for merging, moving it aside if it cannot be read.
fn load_or_quarantine(path: &Path) -> Vec<Candle> {
    match load_and_validate_parquet(path) {
        Ok(candles) => candles,
        Err(e) => {
            let quarantine = path.with_extension("parquet.quarantined");
            warn!(
                path = %path.display(),
                error = %e,
                "quarantining corrupt partition"
            );
            let _ = fs::rename(path, &quarantine);
            Vec::new()
        }
    }
}

/// `(year, path)` for every `{year}.parquet` in a symbol directory, ascending.
fn list_partitions(sym_dir: &Path) -> Result<Vec<(i32, PathBuf)>, DataError> {
    let entries =
        fs::read_dir(sym_dir).map_err(|e| DataError::StoreError(format!("read dir: {e}")))?;
    let mut partitions = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DataError::StoreError(format!("dir entry: {e}")))?;
        let path = entry.path();
        // Skip meta.json, .tmp and .quarantined files
        if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
            continue;
        }
        if let Some(year) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<i32>().ok())
        {
            partitions.push((year, path));
        }
    }
    partitions.sort_by_key(|(year, _)| *year);
    Ok(partitions)
}

fn build_meta(symbol: &str, candles: &[Candle], source: &str) -> Result<StoreMeta, DataError> {
    let (Some(first), Some(last)) = (candles.first(), candles.last()) else {
        return Err(DataError::NoStoredData {
            symbol: symbol.to_string(),
        });
    };
    let bytes = serde_json::to_vec(candles)
        .map_err(|e| DataError::StoreError(format!("hash serialization: {e}")))?;
    Ok(StoreMeta {
        symbol: symbol.to_string(),
        first_timestamp: first.timestamp,
        last_timestamp: last.timestamp,
        candle_count: candles.len(),
        data_hash: blake3::hash(&bytes).to_hex().to_string(),
        source: source.to_string(),
        written_at: chrono::Utc::now().naive_utc(),
    })
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

const COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

fn candles_to_dataframe(candles: &[Candle]) -> Result<DataFrame, DataError> {
    let timestamps: Vec<u64> = candles.iter().map(|c| c.timestamp).collect();
    let opens: Vec<u64> = candles.iter().map(|c| c.open).collect();
    let highs: Vec<u64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<u64> = candles.iter().map(|c| c.low).collect();
    let closes: Vec<u64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    DataFrame::new(vec![
        Column::new("timestamp".into(), timestamps),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<Candle>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::StoreError("empty parquet file".into()));
    }
    for col_name in COLUMNS {
        if df.column(col_name).is_err() {
            return Err(DataError::StoreError(format!("missing column '{col_name}'")));
        }
    }

    dataframe_to_candles(&df)
}

fn dataframe_to_candles(df: &DataFrame) -> Result<Vec<Candle>, DataError> {
    let u64_column = |name: &str| {
        df.column(name)
            .and_then(|c| c.u64().cloned())
            .map_err(|e| DataError::ParquetError(format!("{name} column: {e}")))
    };
    let timestamps = u64_column("timestamp")?;
    let opens = u64_column("open")?;
    let highs = u64_column("high")?;
    let lows = u64_column("low")?;
    let closes = u64_column("close")?;
    let volumes = df
        .column("volume")
        .and_then(|c| c.f64().cloned())
        .map_err(|e| DataError::ParquetError(format!("volume column: {e}")))?;

    let null_at = |name: &str, row: usize| DataError::ParquetError(format!("null {name} at row {row}"));

    (0..df.height())
        .map(|i| -> Result<Candle, DataError> {
            Ok(Candle {
                timestamp: timestamps.get(i).ok_or_else(|| null_at("timestamp", i))?,
                open: opens.get(i).ok_or_else(|| null_at("open", i))?,
                high: highs.get(i).ok_or_else(|| null_at("high", i))?,
                low: lows.get(i).ok_or_else(|| null_at("low", i))?,
                close: closes.get(i).ok_or_else(|| null_at("close", i))?,
                volume: volumes.get(i).ok_or_else(|| null_at("volume", i))?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // 2024-01-01T00:00:00Z and 2025-01-01T00:00:00Z
    const JAN_2024: u64 = 1_704_067_200_000;
    const JAN_2025: u64 = 1_735_689_600_000;
    const HOUR: u64 = 3_600_000;

    fn candle(ts: u64, close: u64) -> Candle {
        Candle::new(ts, close, close + 5, close.saturating_sub(5), close, 10.0)
    }

    fn hourly(start: u64, n: u64) -> Vec<Candle> {
        (0..n).map(|i| candle(start + i * HOUR, 100 + i)).collect()
    }

    fn collect(store: &ParquetStore, query: &CandleQuery) -> Result<Vec<Candle>, StreamError> {
        let mut out = Vec::new();
        store.stream(query, &mut |b: &[Candle]| {
            out.extend_from_slice(b);
            Ok(())
        })?;
        Ok(out)
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path());
        let candles = hourly(JAN_2024, 5);

        let meta = store.write("BTCUSDT", &candles, "test").unwrap();
        assert_eq!(meta.candle_count, 5);
        assert_eq!(meta.first_timestamp, JAN_2024);
        assert_eq!(store.load("BTCUSDT").unwrap(), candles);
        assert!(dir.path().join("symbol=BTCUSDT/2024.parquet").exists());
        assert!(dir.path().join("symbol=BTCUSDT/meta.json").exists());
    }

    #[test]
    fn write_partitions_by_year() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path());
        let candles = hourly(JAN_2025 - 2 * HOUR, 4);
        store.write("BTCUSDT", &candles, "test").unwrap();

        assert!(dir.path().join("symbol=BTCUSDT/2024.parquet").exists());
        assert!(dir.path().join("symbol=BTCUSDT/2025.parquet").exists());
        assert_eq!(store.load("BTCUSDT").unwrap(), candles);
    }

    #[test]
    fn write_merges_and_replaces_by_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path());
        store.write("BTCUSDT", &hourly(JAN_2024, 3), "test").unwrap();

        let update = vec![candle(JAN_2024 + 2 * HOUR, 999), candle(JAN_2024 + 3 * HOUR, 7)];
        let meta = store.write("BTCUSDT", &update, "test").unwrap();

        let all = store.load("BTCUSDT").unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(meta.candle_count, 4);
        assert_eq!(all[2].close, 999);
        assert_eq!(all[3].close, 7);
    }

    #[test]
    fn hash_is_deterministic() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let candles = hourly(JAN_2024, 10);
        let ma = ParquetStore::new(a.path()).write("X", &candles, "test").unwrap();
        let mb = ParquetStore::new(b.path()).write("X", &candles, "test").unwrap();
        assert_eq!(ma.data_hash, mb.data_hash);
    }

    #[test]
    fn stream_is_inclusive_and_ascending() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path()).with_batch_size(3);
        store.write("BTCUSDT", &hourly(JAN_2024, 10), "test").unwrap();

        let query = CandleQuery::new("BTCUSDT", JAN_2024 + 2 * HOUR, JAN_2024 + 6 * HOUR);
        let got = collect(&store, &query).unwrap();
        let ts: Vec<u64> = got.iter().map(|c| c.timestamp).collect();
        assert_eq!(ts, (2..=6).map(|i| JAN_2024 + i * HOUR).collect::<Vec<_>>());
    }

    #[test]
    fn stream_reports_missing_symbol_and_empty_range() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path());
        let err = collect(&store, &CandleQuery::new("NOPE", JAN_2024, JAN_2025)).unwrap_err();
        assert!(matches!(err, StreamError::Source(DataError::NoStoredData { .. })));

        store.write("BTCUSDT", &hourly(JAN_2024, 3), "test").unwrap();
        let err = collect(&store, &CandleQuery::new("BTCUSDT", JAN_2025, JAN_2025 + HOUR))
            .unwrap_err();
        assert!(matches!(err, StreamError::Source(DataError::EmptyRange { .. })));
    }

    #[test]
    fn corrupt_partition_fails_the_stream() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path());
        store.write("BTCUSDT", &hourly(JAN_2024, 3), "test").unwrap();
        store.write("BTCUSDT", &hourly(JAN_2025, 3), "test").unwrap();

        let bad = dir.path().join("symbol=BTCUSDT/2024.parquet");
        fs::write(&bad, b"not parquet").unwrap();

        let query = CandleQuery::new("BTCUSDT", JAN_2024, JAN_2025 + 10 * HOUR);
        let err = collect(&store, &query).unwrap_err();
        assert!(matches!(err, StreamError::Source(DataError::ParquetError(_))), "{err}");
        assert!(matches!(store.load("BTCUSDT"), Err(DataError::ParquetError(_))));
        // Reads leave the file in place; it keeps failing until rewritten.
        assert!(bad.exists());

        // A query that prunes the bad year still streams.
        let later = CandleQuery::new("BTCUSDT", JAN_2025, JAN_2025 + 10 * HOUR);
        assert_eq!(collect(&store, &later).unwrap().len(), 3);
    }

    #[test]
    fn write_quarantines_corrupt_partition_it_merges_into() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path());
        store.write("BTCUSDT", &hourly(JAN_2024, 3), "test").unwrap();

        let bad = dir.path().join("symbol=BTCUSDT/2024.parquet");
        fs::write(&bad, b"not parquet").unwrap();

        let meta = store.write("BTCUSDT", &hourly(JAN_2024 + 10 * HOUR, 2), "test").unwrap();
        assert_eq!(meta.candle_count, 2);
        assert_eq!(store.load("BTCUSDT").unwrap().len(), 2);
        assert!(dir
            .path()
            .join("symbol=BTCUSDT/2024.parquet.quarantined")
            .exists());
    }

    #[test]
    fn len_hint_covers_only_the_queried_overlap() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path());
        assert_eq!(store.len_hint(&CandleQuery::new("BTCUSDT", JAN_2024, JAN_2025)), None);

        store.write("BTCUSDT", &hourly(JAN_2024, 10), "test").unwrap();
        let hint = |start, end| store.len_hint(&CandleQuery::new("BTCUSDT", start, end));

        assert_eq!(hint(0, u64::MAX), Some(10));
        assert_eq!(hint(JAN_2024 + 2 * HOUR, JAN_2024 + 6 * HOUR), Some(5));
        assert_eq!(hint(JAN_2025, JAN_2025 + HOUR), Some(0));
        assert_eq!(hint(0, JAN_2024 - 1), Some(0));
    }

    #[test]
    fn status_and_symbols() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path());
        store.write("ETHUSDT", &hourly(JAN_2024, 2), "test").unwrap();
        store.write("BTCUSDT", &hourly(JAN_2024, 4), "test").unwrap();

        assert_eq!(store.symbols().unwrap(), vec!["BTCUSDT", "ETHUSDT"]);
        let status = store.status(&["BTCUSDT", "SOLUSDT"]);
        assert!(status[0].stored);
        assert_eq!(status[0].candle_count, Some(4));
        assert!(!status[1].stored);
    }

    #[test]
    fn empty_write_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path());
        assert!(store.write("BTCUSDT", &[], "test").is_err());
    }
}
