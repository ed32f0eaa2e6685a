//! Per-symbol CSV cache.
//!
//! Layout: `{data_dir}/{SYMBOL}.csv`, or `{data_dir}/{SYMBOL}_X.csv` for
//! tickers that collide with reserved device names on Windows filesystems.
//!
//! Columns: `Date,Open,High,Low,Close,Volume,delta,delta_pct`. The delta
//! columns are written on every save and ignored on load: a loaded record
//! always recomputes them from its closes.
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity check (strictly increasing, duplicate-free dates)
//! - Self-healing: corrupt files are deleted and the symbol treated as absent

use super::provider::DataError;
use crate::domain::{Bar, SymbolRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Tickers that cannot be used as file stems on every platform.
pub const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const ALIAS_SUFFIX: &str = "_X";
const HEADER: [&str; 8] = [
    "Date", "Open", "High", "Low", "Close", "Volume", "delta", "delta_pct",
];

/// One line of a cache file.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: u64,
    delta: Option<f64>,
    delta_pct: Option<f64>,
}

/// Summary of one cached symbol, for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbol: String,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub rows: usize,
    pub content_hash: Option<String>,
}

/// The CSV cache, rooted at an explicit data directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    data_dir: PathBuf,
}

impl CacheStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Root directory of the cache.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// File stem a symbol is stored under.
    pub fn file_stem(symbol: &str) -> String {
        if is_reserved(symbol) {
            format!("{symbol}{ALIAS_SUFFIX}")
        } else {
            symbol.to_string()
        }
    }

    /// Path of the cache file for a symbol.
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", Self::file_stem(symbol)))
    }

    /// Load a symbol's record, or `None` if nothing is cached.
    ///
    /// A file that exists but cannot be parsed yields `DataError::CorruptCache`.
    pub fn load(&self, symbol: &str) -> Result<Option<SymbolRecord>, DataError> {
        let path = self.path_for(symbol);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DataError::CacheError(format!(
                    "open {}: {e}",
                    path.display()
                )))
            }
        };

        let mut reader = csv::Reader::from_reader(file);
        let mut bars = Vec::new();
        for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|e| DataError::CorruptCache {
                symbol: symbol.to_string(),
                reason: format!("row {}: {e}", i + 1),
            })?;
            bars.push(Bar {
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        Ok(Some(SymbolRecord::from_bars(bars)))
    }

    /// Integrity check: dates must be strictly increasing (no duplicates).
    pub fn validate(record: &SymbolRecord) -> bool {
        record.is_strictly_increasing()
    }

    /// Load a record, treating a corrupt file as absent without touching it.
    pub fn load_checked(&self, symbol: &str) -> Result<Option<SymbolRecord>, DataError> {
        match self.load(symbol) {
            Ok(record) => Ok(record.filter(Self::validate)),
            Err(DataError::CorruptCache { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Load a record and heal it if corrupt.
    ///
    /// A file that fails to parse or fails [`CacheStore::validate`] is deleted
    /// and reported as absent.
    pub fn load_valid(&self, symbol: &str) -> Result<Option<SymbolRecord>, DataError> {
        let reason = match self.load(symbol) {
            Ok(Some(record)) if Self::validate(&record) => return Ok(Some(record)),
            Ok(Some(_)) => "duplicate or out-of-order dates".to_string(),
            Ok(None) => return Ok(None),
            Err(DataError::CorruptCache { reason, .. }) => reason,
            Err(e) => return Err(e),
        };

        warn!(symbol, %reason, "corrupt cache file deleted");
        self.delete(symbol)?;
        Ok(None)
    }

    /// Remove a symbol's cache file. Succeeds if it was already absent.
    pub fn delete(&self, symbol: &str) -> Result<(), DataError> {
        let path = self.path_for(symbol);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DataError::CacheError(format!(
                "delete {}: {e}",
                path.display()
            ))),
        }
    }

    /// Overwrite a symbol's cache file.
    ///
    /// The file is written to `{path}.tmp` and renamed into place, so a
    /// subsequent load sees either the old file or the new one.
    pub fn save(&self, symbol: &str, record: &SymbolRecord) -> Result<(), DataError> {
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let path = self.path_for(symbol);
        let tmp_path = path.with_extension("csv.tmp");

        write_csv(record, &tmp_path)?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        debug!(symbol, rows = record.len(), path = %path.display(), "cache file written");
        Ok(())
    }

    /// BLAKE3 hash of a symbol's cache file, if it exists.
    pub fn content_hash(&self, symbol: &str) -> Result<Option<String>, DataError> {
        match fs::read(self.path_for(symbol)) {
            Ok(bytes) => Ok(Some(blake3::hash(&bytes).to_hex().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DataError::CacheError(format!("read {symbol}: {e}"))),
        }
    }

    /// Symbols that currently have a cache file, sorted.
    pub fn list_symbols(&self) -> Result<Vec<String>, DataError> {
        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DataError::CacheError(format!("read dir: {e}"))),
        };

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                symbols.push(symbol_from_stem(stem));
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    /// Status of a symbol's cache without modifying it.
    pub fn status(&self, symbol: &str) -> Result<CacheStatus, DataError> {
        let record = match self.load(symbol) {
            Ok(record) => record,
            Err(DataError::CorruptCache { .. }) => None,
            Err(e) => return Err(e),
        };
        Ok(CacheStatus {
            symbol: symbol.to_string(),
            first_date: record.as_ref().and_then(|r| r.first_date()),
            last_date: record.as_ref().and_then(|r| r.last_date()),
            rows: record.as_ref().map_or(0, |r| r.len()),
            content_hash: self.content_hash(symbol)?,
        })
    }
}

fn is_reserved(symbol: &str) -> bool {
    RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(symbol))
}

fn symbol_from_stem(stem: &str) -> String {
    match stem.strip_suffix(ALIAS_SUFFIX) {
        Some(base) if is_reserved(base) => base.to_string(),
        _ => stem.to_string(),
    }
}

fn write_csv(record: &SymbolRecord, path: &Path) -> Result<(), DataError> {
    let map_err = |e: csv::Error| DataError::CacheError(format!("write {}: {e}", path.display()));

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(map_err)?;
    writer.write_record(HEADER).map_err(map_err)?;

    for (bar, delta) in record.rows() {
        writer
            .serialize(CsvRow {
                date: bar.date,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                delta: delta.map(|d| d.abs),
                delta_pct: delta.map(|d| d.pct),
            })
            .map_err(map_err)?;
    }

    writer
        .flush()
        .map_err(|e| DataError::CacheError(format!("flush {}: {e}", path.display())))
}
