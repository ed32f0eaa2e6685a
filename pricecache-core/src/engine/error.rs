//! Catch-up engine errors.

use crate::calendar::Direction;
use crate::data::DataError;
use crate::domain::Period;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatchupError {
    #[error("fetch for {period} returned no rows for '{symbol}'")]
    EmptyFetch { symbol: String, period: Period },

    #[error("fetch failed for {period} batch of {count} symbol(s): {source}")]
    FetchFailure {
        period: Period,
        count: usize,
        #[source]
        source: DataError,
    },

    #[error("trading calendar has no session {direction} {date}")]
    CalendarExhausted { date: NaiveDate, direction: Direction },

    #[error("merged series for '{symbol}' is not strictly increasing at {date}")]
    UnorderedMerge { symbol: String, date: NaiveDate },

    #[error("no symbols to catch up: {0}")]
    NoSymbols(String),

    #[error(transparent)]
    Data(#[from] DataError),
}
