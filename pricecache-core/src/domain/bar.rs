//! Bar and SymbolRecord: the cached daily series.

use crate::engine::delta::{self, DailyDelta};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV row for one symbol.
///
/// Fields a provider leaves out are NaN (prices) or zero (volume).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// A bar carrying only a date and a close.
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: f64::NAN,
            high: f64::NAN,
            low: f64::NAN,
            close,
            volume: 0,
        }
    }
}

/// A symbol's cached series: bars in date order plus their derived deltas.
///
/// Deltas are always computed from the bars at construction and are never
/// accepted from outside, so `deltas()[i]` is a function of `bars()[i-1..=i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRecord {
    bars: Vec<Bar>,
    deltas: Vec<Option<DailyDelta>>,
}

impl SymbolRecord {
    pub fn from_bars(bars: Vec<Bar>) -> Self {
        let deltas = delta::recompute(&bars);
        Self { bars, deltas }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn deltas(&self) -> &[Option<DailyDelta>] {
        &self.deltas
    }

    /// Rows paired with their deltas, in date order.
    pub fn rows(&self) -> impl Iterator<Item = (&Bar, Option<&DailyDelta>)> {
        self.bars.iter().zip(self.deltas.iter().map(Option::as_ref))
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// True when dates are strictly increasing (which also rules out duplicates).
    pub fn is_strictly_increasing(&self) -> bool {
        self.bars.windows(2).all(|w| w[0].date < w[1].date)
    }

    /// Give up the derived columns and keep only the raw rows.
    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn record_derives_deltas_from_closes() {
        let record = SymbolRecord::from_bars(vec![
            Bar::from_close(d(2024, 1, 2), 10.0),
            Bar::from_close(d(2024, 1, 3), 12.0),
        ]);
        assert!(record.deltas()[0].is_none());
        assert_eq!(record.deltas()[1].unwrap().abs, 2.0);
        assert_eq!(record.first_date(), Some(d(2024, 1, 2)));
        assert_eq!(record.last_date(), Some(d(2024, 1, 3)));
    }

    #[test]
    fn duplicate_dates_are_not_strictly_increasing() {
        let record = SymbolRecord::from_bars(vec![
            Bar::from_close(d(2024, 1, 2), 10.0),
            Bar::from_close(d(2024, 1, 2), 10.0),
        ]);
        assert!(!record.is_strictly_increasing());
    }

    #[test]
    fn empty_record_has_no_dates() {
        let record = SymbolRecord::from_bars(Vec::new());
        assert!(record.is_empty());
        assert_eq!(record.first_date(), None);
        assert!(record.is_strictly_increasing());
    }

    #[test]
    fn bar_serialization_roundtrip() {
        let bar = Bar {
            date: d(2024, 1, 2),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000,
        };
        let json = serde_json::to_string(&bar).unwrap();
        let back: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar, back);
    }
}
