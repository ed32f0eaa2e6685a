//! Day-over-day close deltas.

use crate::domain::Bar;
use serde::{Deserialize, Serialize};

/// Absolute and percentage change of a close against the previous close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyDelta {
    pub abs: f64,
    pub pct: f64,
}

impl DailyDelta {
    pub fn between(prev_close: f64, close: f64) -> Self {
        let abs = close - prev_close;
        Self {
            abs,
            pct: abs / prev_close * 100.0,
        }
    }
}

/// Recompute deltas for a whole series in one pass.
///
/// The first row has no predecessor and therefore no delta.
pub fn recompute(bars: &[Bar]) -> Vec<Option<DailyDelta>> {
    let mut prev: Option<f64> = None;
    bars.iter()
        .map(|bar| {
            let delta = prev.map(|p| DailyDelta::between(p, bar.close));
            prev = Some(bar.close);
            delta
        })
        .collect()
}
