//! Circuit breaker guarding the history provider.
//!
//! HTTP 403 opens the breaker at once; repeated 429/5xx responses open it once
//! the consecutive-failure threshold is reached. While open, every request is
//! refused until the reopen deadline passes.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    /// Refusing requests until `until`.
    Open { until: Instant },
}

#[derive(Debug)]
struct Counters {
    state: BreakerState,
    failures: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    counters: Mutex<Counters>,
    cooldown: Duration,
    threshold: u32,
}

impl CircuitBreaker {
    /// A `threshold` of zero is treated as one.
    pub fn new(cooldown: Duration, threshold: u32) -> Self {
        Self {
            counters: Mutex::new(Counters {
                state: BreakerState::Closed,
                failures: 0,
            }),
            cooldown,
            threshold: threshold.max(1),
        }
    }

    /// Thirty-minute cooldown after three consecutive failures.
    pub fn default_provider() -> Self {
        Self::new(Duration::from_secs(1800), 3)
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn open(&self, counters: &mut Counters) {
        counters.state = BreakerState::Open {
            until: Instant::now() + self.cooldown,
        };
    }

    /// Whether a request may go out now. An expired open state closes.
    pub fn is_allowed(&self) -> bool {
        let mut counters = self.counters();
        if let BreakerState::Open { until } = counters.state {
            if Instant::now() < until {
                return false;
            }
            counters.state = BreakerState::Closed;
            counters.failures = 0;
        }
        true
    }

    pub fn state(&self) -> BreakerState {
        self.counters().state
    }

    pub fn record_success(&self) {
        self.counters().failures = 0;
    }

    pub fn record_failure(&self) {
        let mut counters = self.counters();
        counters.failures += 1;
        let reached = counters.failures >= self.threshold;
        if reached && counters.state == BreakerState::Closed {
            warn!(
                failures = counters.failures,
                cooldown_secs = self.cooldown.as_secs(),
                "provider breaker opened after repeated failures"
            );
            self.open(&mut counters);
        }
    }

    /// Open immediately, e.g. on an IP block.
    pub fn trip(&self) {
        warn!(
            cooldown_secs = self.cooldown.as_secs(),
            "provider breaker opened by block response"
        );
        let mut counters = self.counters();
        self.open(&mut counters);
    }

    /// Time until requests are allowed again; zero when closed.
    pub fn remaining_cooldown(&self) -> Duration {
        match self.counters().state {
            BreakerState::Closed => Duration::ZERO,
            BreakerState::Open { until } => until.saturating_duration_since(Instant::now()),
        }
    }
}
