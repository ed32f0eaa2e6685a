//! Incremental merge of fetched rows into the cache.
//!
//! The only deduplication rule is `date > last cached date`: rows the cache
//! already covers are never reprocessed or overwritten. Derived delta columns
//! are never merged; they are recomputed over the whole series.

use super::error::CatchupError;
use super::planner::FetchBatch;
use super::progress::CatchupProgress;
use crate::calendar::WINDOW_DAYS;
use crate::data::{CacheStore, HistoryProvider};
use crate::domain::{Bar, Period, SymbolRecord};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// What to do with the rest of a batch after one symbol fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and keep merging the batch.
    #[default]
    Continue,
    /// Stop at the first failing symbol; later symbols in the batch are skipped.
    AbortBatch,
}

/// Result of merging one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// No record existed; one was written with `rows` rows.
    Created { rows: usize },
    /// `rows` new dates were appended to an existing record.
    Appended { rows: usize },
    /// Nothing newer than the cache was fetched.
    Unchanged,
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeOutcome::Created { rows } => write!(f, "created ({rows} rows)"),
            MergeOutcome::Appended { rows } => write!(f, "appended {rows} rows"),
            MergeOutcome::Unchanged => f.write_str("unchanged"),
        }
    }
}

/// Per-symbol result of a batch.
#[derive(Debug)]
pub struct SymbolOutcome {
    pub symbol: String,
    pub period: Period,
    pub result: Result<MergeOutcome, CatchupError>,
}

/// Drop the final row when it repeats the previous row's date.
///
/// Only the last two rows are compared; this is the provider artifact where
/// the latest row comes back twice.
pub fn drop_duplicate_trailing(bars: &mut Vec<Bar>) -> bool {
    let n = bars.len();
    if n >= 2 && bars[n - 1].date == bars[n - 2].date {
        bars.pop();
        true
    } else {
        false
    }
}

/// A merged series ready to persist.
#[derive(Debug)]
pub struct MergedSeries {
    pub record: SymbolRecord,
    pub appended: usize,
    pub existed: bool,
}

/// Combine an existing record with fetched rows.
///
/// Fetched rows dated on or before the record's last date (or `fallback_last`
/// when there is no record) are discarded.
pub fn merge_rows(
    existing: Option<SymbolRecord>,
    fetched: Vec<Bar>,
    fallback_last: NaiveDate,
) -> MergedSeries {
    let existed = existing.is_some();
    let mut bars = existing.map(SymbolRecord::into_bars).unwrap_or_default();
    bars.sort_by_key(|b| b.date);

    let last_date = bars.last().map_or(fallback_last, |b| b.date);
    let before = bars.len();
    bars.extend(fetched.into_iter().filter(|b| b.date > last_date));
    let appended = bars.len() - before;

    MergedSeries {
        record: SymbolRecord::from_bars(bars),
        appended,
        existed,
    }
}

pub struct MergeEngine<'a> {
    store: &'a CacheStore,
    fallback_last: NaiveDate,
    policy: FailurePolicy,
}

impl<'a> MergeEngine<'a> {
    /// Records that do not exist yet take everything after `today − 5y`.
    pub fn new(store: &'a CacheStore, today: NaiveDate, policy: FailurePolicy) -> Self {
        Self {
            store,
            fallback_last: today - Duration::days(WINDOW_DAYS),
            policy,
        }
    }

    /// Merge one symbol's fetched slice and persist the result.
    pub fn merge_symbol(
        &self,
        symbol: &str,
        period: Period,
        fetched: Option<Vec<Bar>>,
    ) -> Result<MergeOutcome, CatchupError> {
        let mut fetched = fetched.unwrap_or_default();
        if fetched.is_empty() {
            return Err(CatchupError::EmptyFetch {
                symbol: symbol.to_string(),
                period,
            });
        }

        if drop_duplicate_trailing(&mut fetched) {
            warn!(symbol, "dropped duplicated trailing row from fetch");
        }

        let existing = self.store.load_valid(symbol)?;
        let merged = merge_rows(existing, fetched, self.fallback_last);

        if let Some(pair) = merged
            .record
            .bars()
            .windows(2)
            .find(|w| w[0].date >= w[1].date)
        {
            return Err(CatchupError::UnorderedMerge {
                symbol: symbol.to_string(),
                date: pair[1].date,
            });
        }

        // Nothing new: leave the file as it is.
        if merged.appended == 0 {
            return Ok(MergeOutcome::Unchanged);
        }

        self.store.save(symbol, &merged.record)?;

        let rows = merged.appended;
        Ok(if merged.existed {
            MergeOutcome::Appended { rows }
        } else {
            MergeOutcome::Created { rows }
        })
    }

    /// Fetch one batch and merge every symbol in it.
    ///
    /// `Err` means the provider call itself failed and nothing was merged.
    /// Otherwise every symbol gets an outcome; under
    /// [`FailurePolicy::AbortBatch`] symbols after the first failure are not
    /// processed and are absent from the returned list.
    pub fn process_batch(
        &self,
        provider: &dyn HistoryProvider,
        batch: &FetchBatch,
        progress: &dyn CatchupProgress,
    ) -> Result<Vec<SymbolOutcome>, CatchupError> {
        let mut rows = provider
            .fetch(&batch.symbols, batch.period)
            .map_err(|source| CatchupError::FetchFailure {
                period: batch.period,
                count: batch.symbols.len(),
                source,
            })?;
        info!(
            provider = provider.name(),
            period = %batch.period,
            count = batch.symbols.len(),
            "history fetched"
        );

        let mut outcomes = Vec::with_capacity(batch.symbols.len());
        for symbol in &batch.symbols {
            let result = self.merge_symbol(symbol, batch.period, rows.remove(symbol));
            progress.on_symbol(symbol, &result);

            let failed = result.is_err();
            outcomes.push(SymbolOutcome {
                symbol: symbol.clone(),
                period: batch.period,
                result,
            });
            if failed && self.policy == FailurePolicy::AbortBatch {
                warn!(symbol = symbol.as_str(), "aborting rest of batch");
                break;
            }
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataError, FetchedRows};
    use crate::engine::progress::NoProgress;
    use tempfile::TempDir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bars(rows: &[(NaiveDate, f64)]) -> Vec<Bar> {
        rows.iter().map(|&(dt, c)| Bar::from_close(dt, c)).collect()
    }

    struct FixedProvider(FetchedRows);

    impl HistoryProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch(&self, _symbols: &[String], _period: Period) -> Result<FetchedRows, DataError> {
            Ok(self.0.clone())
        }
    }

    struct DownProvider;

    impl HistoryProvider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        fn fetch(&self, _symbols: &[String], _period: Period) -> Result<FetchedRows, DataError> {
            Err(DataError::NetworkUnreachable("connection refused".into()))
        }
    }

    #[test]
    fn first_fetch_creates_record_with_deltas() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let engine = MergeEngine::new(&store, d(2024, 1, 10), FailurePolicy::Continue);

        let fetched = bars(&[(d(2024, 1, 2), 10.0), (d(2024, 1, 3), 11.0), (d(2024, 1, 4), 9.0)]);
        let outcome = engine.merge_symbol("X", Period::Ytd, Some(fetched)).unwrap();
        assert_eq!(outcome, MergeOutcome::Created { rows: 3 });

        let record = store.load("X").unwrap().unwrap();
        let deltas = record.deltas();
        assert!(deltas[0].is_none());
        assert_eq!(deltas[1].unwrap().abs, 1.0);
        assert!((deltas[1].unwrap().pct - 10.0).abs() < 1e-9);
        assert_eq!(deltas[2].unwrap().abs, -2.0);
        assert!((deltas[2].unwrap().pct - (-18.181818181818183)).abs() < 1e-9);
    }

    #[test]
    fn duplicated_trailing_fetch_row_is_saved_once() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        store
            .save(
                "X",
                &SymbolRecord::from_bars(bars(&[(d(2024, 1, 2), 10.0), (d(2024, 1, 3), 11.0)])),
            )
            .unwrap();
        let engine = MergeEngine::new(&store, d(2024, 1, 10), FailurePolicy::Continue);

        let fetched = bars(&[
            (d(2024, 1, 4), 12.0),
            (d(2024, 1, 5), 13.0),
            (d(2024, 1, 5), 14.0),
        ]);
        let outcome = engine.merge_symbol("X", Period::FiveDays, Some(fetched)).unwrap();
        assert_eq!(outcome, MergeOutcome::Appended { rows: 2 });

        let record = store.load("X").unwrap().unwrap();
        assert!(CacheStore::validate(&record));
        let dates: Vec<NaiveDate> = record.bars().iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 4), d(2024, 1, 5)]);
        assert_eq!(record.bars()[3].close, 13.0);

        let deltas = record.deltas();
        assert_eq!(deltas[3].unwrap().abs, 1.0);
        assert!((deltas[3].unwrap().pct - 100.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn only_rows_after_last_date_are_appended() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        store
            .save(
                "X",
                &SymbolRecord::from_bars(bars(&[(d(2024, 1, 2), 10.0), (d(2024, 1, 3), 11.0)])),
            )
            .unwrap();
        let engine = MergeEngine::new(&store, d(2024, 1, 10), FailurePolicy::Continue);

        // The overlapping 01-03 row has a different close; it must not win.
        let fetched = bars(&[(d(2024, 1, 3), 99.0), (d(2024, 1, 4), 12.0)]);
        let outcome = engine.merge_symbol("X", Period::FiveDays, Some(fetched)).unwrap();
        assert_eq!(outcome, MergeOutcome::Appended { rows: 1 });

        let record = store.load("X").unwrap().unwrap();
        let closes: Vec<f64> = record.bars().iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![10.0, 11.0, 12.0]);
        assert_eq!(record.deltas()[2].unwrap().abs, 1.0);
    }

    #[test]
    fn nothing_new_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        store
            .save("X", &SymbolRecord::from_bars(bars(&[(d(2024, 1, 3), 11.0)])))
            .unwrap();
        let engine = MergeEngine::new(&store, d(2024, 1, 10), FailurePolicy::Continue);

        let outcome = engine
            .merge_symbol("X", Period::FiveDays, Some(bars(&[(d(2024, 1, 3), 11.0)])))
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Unchanged);
    }

    #[test]
    fn empty_fetch_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let engine = MergeEngine::new(&store, d(2024, 1, 10), FailurePolicy::Continue);

        assert!(matches!(
            engine.merge_symbol("X", Period::OneMonth, Some(Vec::new())),
            Err(CatchupError::EmptyFetch { .. })
        ));
        assert!(matches!(
            engine.merge_symbol("X", Period::OneMonth, None),
            Err(CatchupError::EmptyFetch { .. })
        ));
    }

    #[test]
    fn duplicated_trailing_row_is_dropped_once() {
        let mut fetched = bars(&[
            (d(2024, 1, 2), 10.0),
            (d(2024, 1, 3), 11.0),
            (d(2024, 1, 3), 11.0),
        ]);
        assert!(drop_duplicate_trailing(&mut fetched));
        assert_eq!(fetched.len(), 2);
        assert!(!drop_duplicate_trailing(&mut fetched));

        let mut single = bars(&[(d(2024, 1, 2), 10.0)]);
        assert!(!drop_duplicate_trailing(&mut single));
    }

    #[test]
    fn earlier_duplicates_fail_without_touching_cache() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let engine = MergeEngine::new(&store, d(2024, 1, 10), FailurePolicy::Continue);

        let fetched = bars(&[
            (d(2024, 1, 2), 10.0),
            (d(2024, 1, 2), 10.0),
            (d(2024, 1, 3), 11.0),
        ]);
        assert!(matches!(
            engine.merge_symbol("X", Period::Ytd, Some(fetched)),
            Err(CatchupError::UnorderedMerge { .. })
        ));
        assert!(store.load("X").unwrap().is_none());
    }

    #[test]
    fn absent_record_keeps_only_the_window() {
        let merged = merge_rows(
            None,
            bars(&[(d(2018, 12, 31), 1.0), (d(2019, 6, 3), 2.0)]),
            d(2019, 1, 11),
        );
        assert_eq!(merged.record.len(), 1);
        assert_eq!(merged.record.first_date(), Some(d(2019, 6, 3)));
        assert!(!merged.existed);
    }

    #[test]
    fn continue_policy_processes_every_symbol() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let engine = MergeEngine::new(&store, d(2024, 1, 10), FailurePolicy::Continue);

        let mut rows = FetchedRows::new();
        rows.insert("B".into(), bars(&[(d(2024, 1, 2), 5.0)]));
        let provider = FixedProvider(rows);
        let batch = FetchBatch {
            period: Period::Ytd,
            symbols: vec!["A".into(), "B".into()],
        };

        let outcomes = engine.process_batch(&provider, &batch, &NoProgress).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].result, Err(CatchupError::EmptyFetch { .. })));
        assert_eq!(outcomes[1].result.as_ref().unwrap(), &MergeOutcome::Created { rows: 1 });
    }

    #[test]
    fn abort_policy_stops_at_first_failure() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let engine = MergeEngine::new(&store, d(2024, 1, 10), FailurePolicy::AbortBatch);

        let mut rows = FetchedRows::new();
        rows.insert("B".into(), bars(&[(d(2024, 1, 2), 5.0)]));
        let provider = FixedProvider(rows);
        let batch = FetchBatch {
            period: Period::Ytd,
            symbols: vec!["A".into(), "B".into()],
        };

        let outcomes = engine.process_batch(&provider, &batch, &NoProgress).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(store.load("B").unwrap().is_none());
    }

    #[test]
    fn provider_failure_is_fetch_failure() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let engine = MergeEngine::new(&store, d(2024, 1, 10), FailurePolicy::Continue);
        let batch = FetchBatch {
            period: Period::FiveDays,
            symbols: vec!["A".into()],
        };

        let err = engine.process_batch(&DownProvider, &batch, &NoProgress).unwrap_err();
        assert!(matches!(err, CatchupError::FetchFailure { count: 1, .. }));
    }
}
