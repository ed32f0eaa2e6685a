//! pricecache core: trading calendar, per-symbol CSV cache, staleness
//! classification, incremental merge and delta recompute.
//!
//! A catch-up run:
//! - Classifies each symbol's cached series against the desired window
//! - Groups stale symbols into provider batches by lookback period
//! - Fetches each batch and appends only dates past the cached end
//! - Recomputes the daily change columns over the whole series and rewrites
//!   the file atomically

pub mod calendar;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
