//! Fetch planning: turn per-symbol statuses into ordered provider batches.

use crate::data::MAX_BATCH_SYMBOLS;
use crate::domain::{Period, StalenessStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One provider request: a period and up to [`MAX_BATCH_SYMBOLS`] tickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchBatch {
    pub period: Period,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FetchPlanner {
    batch_size: usize,
    benchmark: Option<String>,
}

impl FetchPlanner {
    /// `batch_size` is clamped to `1..=MAX_BATCH_SYMBOLS`.
    pub fn new(batch_size: usize, benchmark: Option<String>) -> Self {
        Self {
            batch_size: batch_size.clamp(1, MAX_BATCH_SYMBOLS),
            benchmark,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Build the batch list for a run.
    ///
    /// The benchmark, if any, is a singleton `ytd` batch issued first and is
    /// not repeated in the general buckets. Buckets follow
    /// [`Period::FETCH_ORDER`]; within a bucket symbols keep their input order
    /// and appear once.
    pub fn plan(&self, statuses: &[(String, StalenessStatus)]) -> Vec<FetchBatch> {
        let mut batches = Vec::new();

        if let Some(benchmark) = &self.benchmark {
            batches.push(FetchBatch {
                period: Period::Ytd,
                symbols: vec![benchmark.clone()],
            });
        }

        for period in Period::FETCH_ORDER {
            let mut seen = HashSet::new();
            let bucket: Vec<String> = statuses
                .iter()
                .filter(|(_, status)| status.period() == Some(period))
                .map(|(symbol, _)| symbol.as_str())
                .filter(|symbol| self.benchmark.as_deref() != Some(*symbol))
                .filter(|symbol| seen.insert(*symbol))
                .map(str::to_string)
                .collect();

            batches.extend(bucket.chunks(self.batch_size).map(|chunk| FetchBatch {
                period,
                symbols: chunk.to_vec(),
            }));
        }

        batches
    }
}
