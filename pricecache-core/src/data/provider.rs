//! History provider trait and structured data-layer errors.
//!
//! The HistoryProvider trait abstracts over market-data sources so the merge
//! engine can be driven by Yahoo Finance in production and by scripted
//! providers in tests. Providers know nothing about the cache.

use crate::domain::{Bar, Period};
use std::collections::HashMap;
use thiserror::Error;

/// Upper bound on symbols per provider request.
pub const MAX_BATCH_SYMBOLS: usize = 100;

/// Bars returned by one batch fetch, grouped by ticker.
///
/// A ticker the provider could not resolve is either missing from the map or
/// maps to an empty vector; callers treat both the same way.
pub type FetchedRows = HashMap<String, Vec<Bar>>;

/// Structured error types for provider and cache operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("batch of {count} symbols exceeds the provider limit of {limit}")]
    BatchTooLarge { count: usize, limit: usize },

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("corrupt cache file for '{symbol}': {reason}")]
    CorruptCache { symbol: String, reason: String },

    #[error("reference file error: {0}")]
    ReferenceFile(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Source of daily history, fetched by period for a batch of tickers.
pub trait HistoryProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily bars for up to [`MAX_BATCH_SYMBOLS`] tickers.
    ///
    /// Each group is sorted by date ascending. An `Err` means the whole batch
    /// failed (network, provider block); a ticker without data is reported by
    /// an empty or missing group instead.
    fn fetch(&self, symbols: &[String], period: Period) -> Result<FetchedRows, DataError>;

    /// Whether the provider still accepts requests (not rate-limited, not blocked).
    fn is_available(&self) -> bool {
        true
    }
}
