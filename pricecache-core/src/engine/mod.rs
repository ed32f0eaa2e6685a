//! Catch-up engine: classification, planning, merge and delta recompute.

pub mod catchup;
pub mod delta;
pub mod error;
pub mod merge;
pub mod planner;
pub mod progress;
pub mod staleness;

pub use catchup::{Catchup, CatchupReport, CatchupStatus};
pub use delta::DailyDelta;
pub use error::CatchupError;
pub use merge::{FailurePolicy, MergeEngine, MergeOutcome, SymbolOutcome};
pub use planner::{FetchBatch, FetchPlanner};
pub use progress::{CatchupProgress, LogProgress, NoProgress};
pub use staleness::{bucket_for_gap, classify_symbols, StalenessClassifier};
