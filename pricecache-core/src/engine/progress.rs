//! Progress reporting for catch-up runs.

use super::error::CatchupError;
use super::merge::MergeOutcome;
use super::planner::FetchBatch;
use tracing::{error, info};

/// Callbacks for batch and symbol progress.
pub trait CatchupProgress {
    /// Called before a batch is sent to the provider.
    fn on_batch_start(&self, batch: &FetchBatch, index: usize, total: usize);

    /// Called after each symbol in a batch is merged (or fails).
    fn on_symbol(&self, symbol: &str, result: &Result<MergeOutcome, CatchupError>);

    /// Called once the run ends.
    fn on_run_complete(&self, succeeded: usize, failed: usize, skipped: usize);
}

/// Forwards progress to `tracing`.
pub struct LogProgress;

impl CatchupProgress for LogProgress {
    fn on_batch_start(&self, batch: &FetchBatch, index: usize, total: usize) {
        info!(
            batch = index + 1,
            total,
            period = %batch.period,
            count = batch.symbols.len(),
            "fetching batch"
        );
    }

    fn on_symbol(&self, symbol: &str, result: &Result<MergeOutcome, CatchupError>) {
        match result {
            Ok(outcome) => info!(symbol, %outcome, "merged"),
            Err(e) => error!(symbol, error = %e, "merge failed"),
        }
    }

    fn on_run_complete(&self, succeeded: usize, failed: usize, skipped: usize) {
        info!(succeeded, failed, skipped, "catch-up finished");
    }
}

/// Discards all progress events.
pub struct NoProgress;

impl CatchupProgress for NoProgress {
    fn on_batch_start(&self, _batch: &FetchBatch, _index: usize, _total: usize) {}

    fn on_symbol(&self, _symbol: &str, _result: &Result<MergeOutcome, CatchupError>) {}

    fn on_run_complete(&self, _succeeded: usize, _failed: usize, _skipped: usize) {}
}
