//! Reference files: the exchange symbol universe and the options-exclusion list.
//!
//! The universe is a `|`-delimited listing in the NASDAQ `nasdaqtraded.txt`
//! layout. Only its `Symbol` column is read; test and placeholder tickers
//! (anything containing `$` or `.`) are dropped. The trailing
//! `File Creation Time` line and other short rows are skipped.
//!
//! The options-exclusion list is an optional CSV with a `symbol` column,
//! listing tickers with no tradable options. The catch-up engine only loads
//! it; downstream consumers query it.

use super::provider::DataError;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// Ordered list of exchange-traded symbols.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Universe {
    symbols: Vec<String>,
}

impl Universe {
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = fs::read_to_string(path).map_err(|e| {
            DataError::ReferenceFile(format!("read universe file {}: {e}", path.display()))
        })?;
        Self::from_listing(&content)
    }

    /// Parse the `|`-delimited listing.
    pub fn from_listing(content: &str) -> Result<Self, DataError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'|')
            .quoting(false)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| DataError::ReferenceFile(format!("universe header: {e}")))?;
        let col = headers
            .iter()
            .position(|h| h.trim() == "Symbol")
            .ok_or_else(|| DataError::ReferenceFile("universe has no 'Symbol' column".into()))?;
        let width = headers.len();

        let mut symbols = Vec::new();
        let mut seen = HashSet::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| DataError::ReferenceFile(format!("universe row: {e}")))?;
            if record.len() < width {
                continue;
            }
            let Some(symbol) = record.get(col).map(str::trim) else {
                continue;
            };
            if is_placeholder(symbol) {
                continue;
            }
            if seen.insert(symbol.to_string()) {
                symbols.push(symbol.to_string());
            }
        }

        Ok(Self { symbols })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn into_symbols(self) -> Vec<String> {
        self.symbols
    }
}

fn is_placeholder(symbol: &str) -> bool {
    symbol.is_empty() || symbol.contains('$') || symbol.contains('.')
}

/// Symbols known to have no tradable options.
#[derive(Debug, Clone, Default)]
pub struct NoOptionsList {
    symbols: HashSet<String>,
}

impl NoOptionsList {
    /// Load the list; a missing file is an empty list.
    pub fn load(path: &Path) -> Result<Self, DataError> {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_csv(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(DataError::ReferenceFile(format!(
                "read options-exclusion list {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn from_csv(content: &str) -> Result<Self, DataError> {
        let mut reader = csv::Reader::from_reader(content.as_bytes());
        let col = reader
            .headers()
            .map_err(|e| DataError::ReferenceFile(format!("options-exclusion header: {e}")))?
            .iter()
            .position(|h| h.trim() == "symbol")
            .ok_or_else(|| {
                DataError::ReferenceFile("options-exclusion list has no 'symbol' column".into())
            })?;

        let mut symbols = HashSet::new();
        for record in reader.records() {
            let record = record
                .map_err(|e| DataError::ReferenceFile(format!("options-exclusion row: {e}")))?;
            if let Some(symbol) = record.get(col).map(str::trim).filter(|s| !s.is_empty()) {
                symbols.insert(symbol.to_uppercase());
            }
        }
        Ok(Self { symbols })
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(&symbol.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
