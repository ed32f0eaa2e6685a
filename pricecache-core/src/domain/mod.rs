//! Domain types: daily bars, cached records, staleness buckets.

pub mod bar;
pub mod status;

pub use bar::{Bar, SymbolRecord};
pub use status::{Period, StalenessStatus};
