//! Staleness buckets and the fetch periods they map to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fetchable history period, named after the provider's range granularities.
///
/// Variants are declared in increasing order of requested history, so the
/// derived `Ord` compares how much data a period asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1yr")]
    OneYear,
    /// Full refetch of the maximal window the cache keeps.
    #[serde(rename = "ytd")]
    Ytd,
}

impl Period {
    /// Order in which buckets are fetched during a catch-up run.
    pub const FETCH_ORDER: [Period; 6] = [
        Period::Ytd,
        Period::FiveDays,
        Period::OneMonth,
        Period::ThreeMonths,
        Period::SixMonths,
        Period::OneYear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Ytd => "ytd",
            Period::FiveDays => "5d",
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1yr",
        }
    }

    /// Approximate calendar days of history the period covers.
    pub fn lookback_days(&self) -> i64 {
        match self {
            Period::FiveDays => 7,
            Period::OneMonth => 31,
            Period::ThreeMonths => 92,
            Period::SixMonths => 183,
            Period::OneYear => 365,
            Period::Ytd => 365 * 5,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::FETCH_ORDER
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown period '{s}'"))
    }
}

/// Freshness of a symbol's cached series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessStatus {
    /// The cache needs a fetch of the given period.
    Fetch(Period),
    /// The cache already holds the most recent completed trading day.
    Good,
}

impl StalenessStatus {
    pub fn period(&self) -> Option<Period> {
        match self {
            StalenessStatus::Fetch(p) => Some(*p),
            StalenessStatus::Good => None,
        }
    }

    pub fn is_good(&self) -> bool {
        matches!(self, StalenessStatus::Good)
    }
}

impl fmt::Display for StalenessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StalenessStatus::Fetch(p) => p.fmt(f),
            StalenessStatus::Good => f.write_str("good"),
        }
    }
}

impl FromStr for StalenessStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("good") {
            return Ok(StalenessStatus::Good);
        }
        s.parse().map(StalenessStatus::Fetch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_names_roundtrip_through_from_str() {
        for p in Period::FETCH_ORDER {
            assert_eq!(p.as_str().parse::<Period>().unwrap(), p);
        }
        assert!("2y".parse::<Period>().is_err());
    }

    #[test]
    fn ord_follows_requested_history() {
        let mut sorted = Period::FETCH_ORDER.to_vec();
        sorted.sort();
        let lookbacks: Vec<i64> = sorted.iter().map(|p| p.lookback_days()).collect();
        assert!(lookbacks.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sorted.last(), Some(&Period::Ytd));
    }

    #[test]
    fn status_display_matches_bucket_names() {
        assert_eq!(StalenessStatus::Good.to_string(), "good");
        assert_eq!(StalenessStatus::Fetch(Period::OneYear).to_string(), "1yr");
        assert_eq!(
            "GOOD".parse::<StalenessStatus>().unwrap(),
            StalenessStatus::Good
        );
        assert_eq!(
            "3mo".parse::<StalenessStatus>().unwrap(),
            StalenessStatus::Fetch(Period::ThreeMonths)
        );
    }
}
