//! Top-level catch-up run: resolve symbols, classify, plan, fetch, merge.

use super::error::CatchupError;
use super::merge::{MergeEngine, SymbolOutcome};
use super::planner::{FetchBatch, FetchPlanner};
use super::progress::CatchupProgress;
use super::staleness::{classify_symbols, StalenessClassifier};
use crate::calendar::TradingCalendar;
use crate::config::CatchupConfig;
use crate::data::{CacheStore, DataError, HistoryProvider, NoOptionsList, Universe};
use crate::domain::StalenessStatus;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{error, info};

/// Binary outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CatchupStatus {
    Complete,
    Error,
}

impl fmt::Display for CatchupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatchupStatus::Complete => f.write_str("complete"),
            CatchupStatus::Error => f.write_str("error"),
        }
    }
}

/// Everything a run did.
#[derive(Debug, Default)]
pub struct CatchupReport {
    pub outcomes: Vec<SymbolOutcome>,
    /// The error that stopped the run early, if any.
    pub aborted: Option<CatchupError>,
    /// Symbols that were planned but never merged.
    pub skipped: usize,
}

impl CatchupReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    /// `Complete` only when nothing failed and the run was not aborted.
    pub fn status(&self) -> CatchupStatus {
        if self.aborted.is_none() && self.failed() == 0 {
            CatchupStatus::Complete
        } else {
            CatchupStatus::Error
        }
    }
}

pub struct Catchup {
    config: CatchupConfig,
    store: CacheStore,
    calendar: TradingCalendar,
    no_options: NoOptionsList,
    today: NaiveDate,
}

impl Catchup {
    /// Build a run for `today` against the NYSE calendar.
    pub fn new(config: CatchupConfig, today: NaiveDate) -> Result<Self, CatchupError> {
        let calendar = TradingCalendar::nyse(today);
        Self::with_calendar(config, calendar, today)
    }

    /// Build a run with an explicit calendar.
    pub fn with_calendar(
        config: CatchupConfig,
        calendar: TradingCalendar,
        today: NaiveDate,
    ) -> Result<Self, CatchupError> {
        let no_options = NoOptionsList::load(&config.no_options_file)?;
        let store = CacheStore::new(config.data_dir.clone());
        Ok(Self {
            config,
            store,
            calendar,
            no_options,
            today,
        })
    }

    pub fn config(&self) -> &CatchupConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    /// Symbols listed as having no options market. Not used by the merge.
    pub fn no_options(&self) -> &NoOptionsList {
        &self.no_options
    }

    /// Explicit symbols are trimmed, uppercased and deduplicated in order.
    /// Without them the universe file supplies the list.
    pub fn resolve_symbols(&self, symbols: Option<&[String]>) -> Result<Vec<String>, CatchupError> {
        let resolved = match symbols {
            Some(list) => {
                let mut seen = HashSet::new();
                list.iter()
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .filter(|s| seen.insert(s.clone()))
                    .collect::<Vec<_>>()
            }
            None => Universe::from_file(&self.config.universe_file)?.into_symbols(),
        };

        if resolved.is_empty() {
            let source = match symbols {
                Some(_) => "symbol list is empty".to_string(),
                None => format!(
                    "universe file {} lists no symbols",
                    self.config.universe_file.display()
                ),
            };
            return Err(CatchupError::NoSymbols(source));
        }
        Ok(resolved)
    }

    /// Classifier for this run's window.
    pub fn classifier(&self) -> Result<StalenessClassifier<'_>, CatchupError> {
        StalenessClassifier::new(
            &self.calendar,
            self.config.resolved_start(self.today),
            self.today,
        )
    }

    /// Staleness of each symbol, healing corrupt cache files.
    pub fn classify(
        &self,
        symbols: &[String],
    ) -> Result<Vec<(String, StalenessStatus)>, CatchupError> {
        let classifier = self.classifier()?;
        classify_symbols(&self.store, &classifier, symbols, true)
    }

    /// Batches a catch-up would issue, without modifying the cache.
    ///
    /// Corrupt cache files are planned for as absent and kept on disk.
    pub fn preview(&self, symbols: &[String]) -> Result<Vec<FetchBatch>, CatchupError> {
        let classifier = self.classifier()?;
        let statuses = classify_symbols(&self.store, &classifier, symbols, false)?;
        Ok(self.plan(&statuses))
    }

    pub fn plan(&self, statuses: &[(String, StalenessStatus)]) -> Vec<FetchBatch> {
        FetchPlanner::new(self.config.batch_size, Some(self.config.benchmark_symbol()))
            .plan(statuses)
    }

    /// Run a full catch-up.
    ///
    /// Errors before the first fetch (no symbols, calendar window, cache I/O
    /// during classification) are returned as `Err`. Anything after that is
    /// recorded in the report; a failed provider call stops the remaining
    /// batches.
    pub fn run(
        &self,
        provider: &dyn HistoryProvider,
        symbols: Option<&[String]>,
        progress: &dyn CatchupProgress,
    ) -> Result<CatchupReport, CatchupError> {
        let symbols = self.resolve_symbols(symbols)?;
        let statuses = self.classify(&symbols)?;
        let batches = self.plan(&statuses);

        let good = statuses.iter().filter(|(_, s)| s.is_good()).count();
        info!(
            symbols = symbols.len(),
            good,
            batches = batches.len(),
            provider = provider.name(),
            "catch-up planned"
        );

        let engine = MergeEngine::new(&self.store, self.today, self.config.failure_policy);
        let mut report = CatchupReport::default();

        for (index, batch) in batches.iter().enumerate() {
            progress.on_batch_start(batch, index, batches.len());

            let result = if provider.is_available() {
                engine.process_batch(provider, batch, progress)
            } else {
                Err(CatchupError::FetchFailure {
                    period: batch.period,
                    count: batch.symbols.len(),
                    source: DataError::CircuitBreakerTripped,
                })
            };

            match result {
                Ok(outcomes) => {
                    report.skipped += batch.symbols.len() - outcomes.len();
                    report.outcomes.extend(outcomes);
                }
                Err(e) => {
                    error!(period = %batch.period, error = %e, "aborting catch-up");
                    report.skipped += batches[index..]
                        .iter()
                        .map(|b| b.symbols.len())
                        .sum::<usize>();
                    report.aborted = Some(e);
                    break;
                }
            }
        }

        progress.on_run_complete(report.succeeded(), report.failed(), report.skipped);
        Ok(report)
    }
}
