//! Staleness classification.
//!
//! Policy, in order:
//! 1. No cached record → `ytd`.
//! 2. Cache starts after the desired window start (compared as sessions) →
//!    `ytd`. Left-side gaps are never backfilled partially.
//! 3. Cache ends before the most recent session on or before today → bucket
//!    by the calendar-day gap between today and the last cached date.
//! 4. Otherwise → `good`.

use super::error::CatchupError;
use crate::calendar::{Direction, TradingCalendar};
use crate::data::CacheStore;
use crate::domain::{Period, StalenessStatus, SymbolRecord};
use chrono::NaiveDate;
use tracing::debug;

/// Bucket for a calendar-day gap between today and the last cached date.
///
/// Each bucket requests at least as much history as the gap needs.
pub fn bucket_for_gap(gap_days: i64) -> Period {
    match gap_days.abs() {
        g if g < 6 => Period::FiveDays,
        g if g < 32 => Period::OneMonth,
        g if g < 95 => Period::ThreeMonths,
        g if g < 185 => Period::SixMonths,
        _ => Period::OneYear,
    }
}

#[derive(Debug)]
pub struct StalenessClassifier<'a> {
    calendar: &'a TradingCalendar,
    today: NaiveDate,
    start_session: NaiveDate,
    latest_session: NaiveDate,
}

impl<'a> StalenessClassifier<'a> {
    /// Resolve the window bounds once.
    ///
    /// Both `start` and `today` must fall inside the calendar window; anything
    /// else is a configuration error surfaced as `CalendarExhausted`.
    pub fn new(
        calendar: &'a TradingCalendar,
        start: NaiveDate,
        today: NaiveDate,
    ) -> Result<Self, CatchupError> {
        let start_session = calendar.nearest(start, Direction::Forward).ok_or(
            CatchupError::CalendarExhausted {
                date: start,
                direction: Direction::Forward,
            },
        )?;
        let latest_session = calendar.nearest(today, Direction::Back).ok_or(
            CatchupError::CalendarExhausted {
                date: today,
                direction: Direction::Back,
            },
        )?;
        if calendar.first().map_or(true, |first| start < first) {
            return Err(CatchupError::CalendarExhausted {
                date: start,
                direction: Direction::Back,
            });
        }

        Ok(Self {
            calendar,
            today,
            start_session,
            latest_session,
        })
    }

    /// Most recent completed session the cache should reach.
    pub fn latest_session(&self) -> NaiveDate {
        self.latest_session
    }

    pub fn classify(&self, record: Option<&SymbolRecord>) -> StalenessStatus {
        let (Some(first), Some(last)) = (
            record.and_then(SymbolRecord::first_date),
            record.and_then(SymbolRecord::last_date),
        ) else {
            return StalenessStatus::Fetch(Period::Ytd);
        };

        // A first date past the window end has no forward session; it still
        // starts later than the desired window.
        let starts_late = self
            .calendar
            .nearest(first, Direction::Forward)
            .map_or(true, |f| self.start_session < f);
        if starts_late {
            return StalenessStatus::Fetch(Period::Ytd);
        }

        // A last date before the window start has no back session; it is
        // behind by definition.
        let behind = self
            .calendar
            .nearest(last, Direction::Back)
            .map_or(true, |l| self.latest_session > l);
        if behind {
            let gap = (self.today - last).num_days();
            return StalenessStatus::Fetch(bucket_for_gap(gap));
        }

        StalenessStatus::Good
    }
}

/// Classify each symbol's cache.
///
/// With `heal` set, corrupt files are deleted along the way; otherwise they
/// are classified as absent and left on disk. Returns the symbols in input
/// order paired with their status.
pub fn classify_symbols(
    store: &CacheStore,
    classifier: &StalenessClassifier<'_>,
    symbols: &[String],
    heal: bool,
) -> Result<Vec<(String, StalenessStatus)>, CatchupError> {
    symbols
        .iter()
        .map(|symbol| {
            let record = if heal {
                store.load_valid(symbol)?
            } else {
                store.load_checked(symbol)?
            };
            let status = classifier.classify(record.as_ref());
            debug!(symbol = symbol.as_str(), %status, "classified");
            Ok((symbol.clone(), status))
        })
        .collect()
}
