//! Property tests for cache invariants.
//!
//! Uses proptest to verify:
//! 1. Delta relation: absent at row 0, exact difference and percentage after
//! 2. Merge keeps dates strictly increasing and never rewrites cached rows
//! 3. Gap bucketing is monotonic
//! 4. Planner batches stay within bounds and cover every stale symbol once

use chrono::{Duration, NaiveDate};
use pricecache_core::domain::{Bar, Period, StalenessStatus, SymbolRecord};
use pricecache_core::engine::delta::recompute;
use pricecache_core::engine::merge::merge_rows;
use pricecache_core::engine::{bucket_for_gap, FetchPlanner};
use proptest::prelude::*;
use std::collections::HashMap;

// ── Strategies (proptest) ────────────────────────────────────────────

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
}

fn arb_close() -> impl Strategy<Value = f64> {
    (1.0..1000.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

/// Strictly increasing dates built from positive day steps.
fn arb_series(max_len: usize) -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((1i64..5, arb_close()), 0..max_len).prop_map(|steps| {
        let mut date = base_date();
        steps
            .into_iter()
            .map(|(step, close)| {
                date += Duration::days(step);
                Bar {
                    date,
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 100,
                }
            })
            .collect()
    })
}

fn arb_period() -> impl Strategy<Value = Period> {
    prop::sample::select(Period::FETCH_ORDER.to_vec())
}

fn arb_status() -> impl Strategy<Value = StalenessStatus> {
    prop_oneof![
        Just(StalenessStatus::Good),
        arb_period().prop_map(StalenessStatus::Fetch),
    ]
}

// ── 1. Delta relation ────────────────────────────────────────────────

proptest! {
    #[test]
    fn deltas_follow_consecutive_closes(bars in arb_series(60)) {
        let deltas = recompute(&bars);
        prop_assert_eq!(deltas.len(), bars.len());
        if let Some(first) = deltas.first() {
            prop_assert!(first.is_none());
        }
        for i in 1..bars.len() {
            let delta = deltas[i].unwrap();
            let prev = bars[i - 1].close;
            prop_assert!((delta.abs - (bars[i].close - prev)).abs() < 1e-9);
            prop_assert!((delta.pct - (bars[i].close - prev) / prev * 100.0).abs() < 1e-9);
        }
    }
}

// ── 2. Merge ordering ────────────────────────────────────────────────

proptest! {
    /// Whatever the provider returns, a merged series is strictly increasing
    /// and its prefix is exactly the cached rows.
    #[test]
    fn merge_preserves_cached_prefix(
        cached in arb_series(40),
        offset in -30i64..30,
        fetched in arb_series(40),
    ) {
        let fetched: Vec<Bar> = fetched
            .into_iter()
            .map(|mut b| {
                b.date += Duration::days(offset + 60);
                b
            })
            .collect();
        let existing = SymbolRecord::from_bars(cached.clone());
        let merged = merge_rows(Some(existing), fetched, base_date());

        prop_assert!(merged.record.is_strictly_increasing());
        prop_assert_eq!(&merged.record.bars()[..cached.len()], &cached[..]);
        prop_assert_eq!(merged.record.len(), cached.len() + merged.appended);
        if let Some(last) = cached.last() {
            for bar in &merged.record.bars()[cached.len()..] {
                prop_assert!(bar.date > last.date);
            }
        }
    }

    /// Merging the same fetch twice appends nothing the second time.
    #[test]
    fn merge_is_idempotent(cached in arb_series(30), fetched in arb_series(30)) {
        let once = merge_rows(
            Some(SymbolRecord::from_bars(cached)),
            fetched.clone(),
            base_date(),
        );
        let twice = merge_rows(Some(once.record.clone()), fetched, base_date());
        prop_assert_eq!(twice.appended, 0);
        prop_assert_eq!(twice.record, once.record);
    }
}

// ── 3. Bucket monotonicity ───────────────────────────────────────────

proptest! {
    #[test]
    fn wider_gap_never_gets_shorter_period(a in 0i64..1000, b in 0i64..1000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(bucket_for_gap(lo) <= bucket_for_gap(hi));
    }

    #[test]
    fn negative_gap_buckets_like_its_magnitude(gap in 0i64..1000) {
        prop_assert_eq!(bucket_for_gap(-gap), bucket_for_gap(gap));
    }
}

// ── 4. Planner bounds ────────────────────────────────────────────────

proptest! {
    #[test]
    fn planner_batches_are_bounded_and_complete(
        entries in prop::collection::vec((0usize..300, arb_status()), 0..400),
        batch_size in 1usize..150,
    ) {
        // One status per symbol, as classification produces.
        let mut by_symbol = HashMap::new();
        let statuses: Vec<(String, StalenessStatus)> = entries
            .into_iter()
            .map(|(i, s)| (format!("S{i}"), s))
            .filter(|(sym, s)| by_symbol.insert(sym.clone(), *s).is_none())
            .collect();

        let planner = FetchPlanner::new(batch_size, Some("SPY".into()));
        let plan = planner.plan(&statuses);

        prop_assert_eq!(plan[0].period, Period::Ytd);
        prop_assert_eq!(&plan[0].symbols, &vec!["SPY".to_string()]);

        let mut seen = HashMap::new();
        for batch in &plan[1..] {
            prop_assert!(!batch.symbols.is_empty());
            prop_assert!(batch.symbols.len() <= planner.batch_size());
            prop_assert!(batch.symbols.len() <= 100);
            for sym in &batch.symbols {
                prop_assert!(seen.insert(sym.clone(), batch.period).is_none());
            }
        }

        let stale: Vec<_> = statuses.iter().filter(|(_, s)| !s.is_good()).collect();
        prop_assert_eq!(seen.len(), stale.len());
        for (sym, status) in stale {
            prop_assert_eq!(Some(seen[sym]), status.period());
        }
    }
}
