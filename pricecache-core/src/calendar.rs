//! Trading calendar: the ordered set of NYSE sessions over a fixed window.
//!
//! The calendar is built once per run and never mutated. It spans
//! `[center − 5y, center + 5y]` where 5y is `365 × 5` days, and answers
//! nearest-session queries in either direction.
//!
//! Sessions are generated from the exchange's holiday rules rather than read
//! from a file: weekdays minus the full-day NYSE holidays (with the weekend
//! observation rules) and a short list of one-off closures.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-width of the calendar window in days.
pub const WINDOW_DAYS: i64 = 365 * 5;

/// Unscheduled full-day closures (national days of mourning).
const SPECIAL_CLOSURES: &[(i32, u32, u32)] = &[(2018, 12, 5), (2025, 1, 9)];

/// Direction of a nearest-session query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Earliest session on or after the date.
    Forward,
    /// Latest session on or before the date.
    Back,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("on or after"),
            Direction::Back => f.write_str("on or before"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TradingCalendar {
    sessions: Vec<NaiveDate>,
}

impl TradingCalendar {
    /// Build from an arbitrary list of session dates (sorted and deduplicated here).
    pub fn from_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        let mut sessions: Vec<NaiveDate> = dates.into_iter().collect();
        sessions.sort_unstable();
        sessions.dedup();
        Self { sessions }
    }

    /// NYSE sessions over `[center − 5y, center + 5y]`.
    pub fn nyse(center: NaiveDate) -> Self {
        let start = center - Duration::days(WINDOW_DAYS);
        let end = center + Duration::days(WINDOW_DAYS);
        Self::from_dates(
            start
                .iter_days()
                .take_while(|d| *d <= end)
                .filter(|d| is_nyse_session(*d)),
        )
    }

    pub fn nearest(&self, date: NaiveDate, direction: Direction) -> Option<NaiveDate> {
        match direction {
            Direction::Forward => {
                let idx = self.sessions.partition_point(|s| *s < date);
                self.sessions.get(idx).copied()
            }
            Direction::Back => {
                let idx = self.sessions.partition_point(|s| *s <= date);
                idx.checked_sub(1).map(|i| self.sessions[i])
            }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.sessions.binary_search(&date).is_ok()
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.sessions.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.sessions.last().copied()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions in the half-open interval `(after, until]`.
    pub fn trading_days_between(&self, after: NaiveDate, until: NaiveDate) -> usize {
        if until <= after {
            return 0;
        }
        let lo = self.sessions.partition_point(|s| *s <= after);
        let hi = self.sessions.partition_point(|s| *s <= until);
        hi - lo
    }
}

// ── NYSE holiday rules ──────────────────────────────────────────────

fn is_nyse_session(date: NaiveDate) -> bool {
    if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    if SPECIAL_CLOSURES
        .iter()
        .any(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d) == Some(date))
    {
        return false;
    }
    !nyse_holidays(date.year()).contains(&date)
}

/// Full-day NYSE holidays observed in `year`.
fn nyse_holidays(year: i32) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(10);

    // New Year's Day: a Saturday holiday is not moved back into December.
    if let Some(jan1) = NaiveDate::from_ymd_opt(year, 1, 1) {
        match jan1.weekday() {
            Weekday::Sat => {}
            Weekday::Sun => days.push(jan1 + Duration::days(1)),
            _ => days.push(jan1),
        }
    }

    days.extend(nth_weekday(year, 1, Weekday::Mon, 3)); // Martin Luther King Jr. Day
    days.extend(nth_weekday(year, 2, Weekday::Mon, 3)); // Washington's Birthday
    days.extend(easter_sunday(year).map(|e| e - Duration::days(2))); // Good Friday
    days.extend(last_weekday(year, 5, Weekday::Mon)); // Memorial Day
    if year >= 2022 {
        days.extend(observed(year, 6, 19)); // Juneteenth
    }
    days.extend(observed(year, 7, 4));
    days.extend(nth_weekday(year, 9, Weekday::Mon, 1)); // Labor Day
    days.extend(nth_weekday(year, 11, Weekday::Thu, 4)); // Thanksgiving
    days.extend(observed(year, 12, 25));

    days
}

/// Saturday holidays move to Friday, Sunday holidays to Monday.
fn observed(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    })
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let (next_y, next_m) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let mut date = NaiveDate::from_ymd_opt(next_y, next_m, 1)? - Duration::days(1);
    while date.weekday() != weekday {
        date -= Duration::days(1);
    }
    Some(date)
}

/// Gregorian Easter (anonymous Gregorian algorithm).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}
