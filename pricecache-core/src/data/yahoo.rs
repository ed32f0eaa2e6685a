//! Yahoo Finance history provider.
//!
//! Uses the v8 chart endpoint with a `range` parameter, one request per ticker
//! inside a batch. Transient failures are retried with exponential backoff;
//! blocks and repeated failures open the shared circuit breaker.
//!
//! Yahoo has no official API and changes its response format without notice.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, FetchedRows, HistoryProvider, MAX_BATCH_SYMBOLS};
use crate::domain::{Bar, Period};
use chrono::{DateTime, NaiveDate};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartSeries>>,
    error: Option<ChartFault>,
}

#[derive(Debug, Deserialize)]
struct ChartFault {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartSeries {
    /// Absent when the range holds no sessions.
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<QuoteColumns>,
}

/// Column-oriented quotes; any cell may be null.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteColumns {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

impl QuoteColumns {
    fn cell<T: Copy>(column: &[Option<T>], i: usize) -> Option<T> {
        column.get(i).copied().flatten()
    }
}

/// Result of one HTTP attempt.
enum Attempt {
    Done(Result<Vec<Bar>, DataError>),
    Retry(DataError),
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    breaker: Arc<CircuitBreaker>,
    base_url: String,
    max_retries: u32,
    backoff: Duration,
}

impl YahooProvider {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("HTTP client setup: {e}")))?;

        Ok(Self {
            client,
            breaker,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 3,
            backoff: Duration::from_millis(500),
        })
    }

    /// Point the provider at another host (mirrors, local test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The `range` value requested for a period.
    ///
    /// `ytd` is the full-refetch bucket, so it asks for the whole five-year
    /// window the cache keeps rather than Yahoo's year-to-date range.
    pub fn range_param(period: Period) -> &'static str {
        match period {
            Period::Ytd => "5y",
            Period::FiveDays => "5d",
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
        }
    }

    fn chart_url(&self, symbol: &str, period: Period) -> String {
        format!(
            "{}/v8/finance/chart/{symbol}?range={}&interval=1d",
            self.base_url.trim_end_matches('/'),
            Self::range_param(period)
        )
    }

    fn session_date(ts: i64) -> Result<NaiveDate, DataError> {
        DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("timestamp out of range: {ts}")))
    }

    fn decode(symbol: &str, envelope: ChartEnvelope) -> Result<Vec<Bar>, DataError> {
        let ChartBody { result, error } = envelope.chart;
        let series = match (result, error) {
            (Some(list), _) => list.into_iter().next().ok_or_else(|| {
                DataError::ResponseFormatChanged("chart result list is empty".into())
            })?,
            (None, Some(fault)) if fault.code == "Not Found" => {
                return Err(DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                })
            }
            (None, Some(fault)) => {
                return Err(DataError::ResponseFormatChanged(format!(
                    "{}: {}",
                    fault.code, fault.description
                )))
            }
            (None, None) => {
                return Err(DataError::ResponseFormatChanged(
                    "chart has neither result nor error".into(),
                ))
            }
        };

        if series.timestamp.is_empty() {
            return Ok(Vec::new());
        }
        let quotes = series
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("chart has no quote block".into()))?;

        let mut bars = Vec::with_capacity(series.timestamp.len());
        for (i, &ts) in series.timestamp.iter().enumerate() {
            // A row without a close is useless to the cache.
            let Some(close) = QuoteColumns::cell(&quotes.close, i) else {
                continue;
            };
            bars.push(Bar {
                date: Self::session_date(ts)?,
                open: QuoteColumns::cell(&quotes.open, i).unwrap_or(f64::NAN),
                high: QuoteColumns::cell(&quotes.high, i).unwrap_or(f64::NAN),
                low: QuoteColumns::cell(&quotes.low, i).unwrap_or(f64::NAN),
                close,
                volume: QuoteColumns::cell(&quotes.volume, i).unwrap_or(0),
            });
        }
        Ok(bars)
    }

    fn attempt(&self, url: &str, symbol: &str) -> Attempt {
        let resp = match self.client.get(url).send() {
            Ok(resp) => resp,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Attempt::Retry(DataError::NetworkUnreachable(e.to_string()))
            }
            Err(e) => return Attempt::Done(Err(DataError::NetworkUnreachable(e.to_string()))),
        };

        match resp.status() {
            StatusCode::FORBIDDEN => {
                self.breaker.trip();
                Attempt::Done(Err(DataError::CircuitBreakerTripped))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                self.breaker.record_failure();
                let retry_after_secs = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                Attempt::Retry(DataError::RateLimited { retry_after_secs })
            }
            StatusCode::UNAUTHORIZED => Attempt::Done(Err(DataError::AuthenticationRequired(
                "Yahoo Finance rejected the request as unauthenticated".into(),
            ))),
            StatusCode::NOT_FOUND => Attempt::Done(Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })),
            status if !status.is_success() => {
                self.breaker.record_failure();
                Attempt::Retry(DataError::Other(format!("HTTP {status} for {symbol}")))
            }
            _ => {
                let decoded = resp
                    .json::<ChartEnvelope>()
                    .map_err(|e| {
                        DataError::ResponseFormatChanged(format!("chart JSON for {symbol}: {e}"))
                    })
                    .and_then(|envelope| Self::decode(symbol, envelope));
                if decoded.is_ok() {
                    self.breaker.record_success();
                }
                Attempt::Done(decoded)
            }
        }
    }

    /// One symbol's history. Retries transient failures while the breaker
    /// stays closed.
    fn fetch_symbol(&self, symbol: &str, period: Period) -> Result<Vec<Bar>, DataError> {
        let url = self.chart_url(symbol, period);
        let mut last_error = DataError::Other(format!("no attempt made for {symbol}"));

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff * 2u32.pow(attempt - 1);
                debug!(symbol, attempt, delay_ms = delay.as_millis() as u64, "retrying chart request");
                std::thread::sleep(delay);
            }
            if !self.breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }
            match self.attempt(&url, symbol) {
                Attempt::Done(result) => return result,
                Attempt::Retry(e) => last_error = e,
            }
        }
        Err(last_error)
    }
}

impl HistoryProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(&self, symbols: &[String], period: Period) -> Result<FetchedRows, DataError> {
        if symbols.len() > MAX_BATCH_SYMBOLS {
            return Err(DataError::BatchTooLarge {
                count: symbols.len(),
                limit: MAX_BATCH_SYMBOLS,
            });
        }
        info!(provider = self.name(), %period, count = symbols.len(), "history request");

        let mut rows = FetchedRows::with_capacity(symbols.len());
        for symbol in symbols {
            let bars = match self.fetch_symbol(symbol, period) {
                Ok(bars) => bars,
                // Unknown tickers surface as empty slices, not batch failures.
                Err(DataError::SymbolNotFound { .. }) => {
                    warn!(symbol = symbol.as_str(), "symbol not found at provider");
                    Vec::new()
                }
                Err(e) => return Err(e),
            };
            rows.insert(symbol.clone(), bars);
        }
        Ok(rows)
    }

    fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }
}
