//! Data layer: provider trait, Yahoo provider, CSV cache, reference files.

pub mod cache;
pub mod circuit_breaker;
pub mod provider;
pub mod universe;
pub mod yahoo;

pub use cache::{CacheStatus, CacheStore};
pub use circuit_breaker::CircuitBreaker;
pub use provider::{DataError, FetchedRows, HistoryProvider, MAX_BATCH_SYMBOLS};
pub use universe::{NoOptionsList, Universe};
pub use yahoo::YahooProvider;
