//! Per-instrument state table.
//!
//! Maps an instrument identifier to its rolling window + RSI estimator
//! pair. Entries are created lazily on first trade and live for the
//! process lifetime; the table is bounded by the cardinality of distinct
//! instruments observed. Synchronization is per entry (the sharded map
//! plus an entry mutex), so unrelated instruments never serialize on a
//! common lock, and independent ingest loops may shard the token space.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::rolling_window::RollingWindow;
use crate::rsi::{RsiBands, RsiReading, WilderRsi};

/// The window/estimator pair owned by one instrument.
#[derive(Debug)]
pub struct InstrumentState {
    pub window: RollingWindow,
    pub rsi: WilderRsi,
}

impl InstrumentState {
    fn new(period: usize, bands: RsiBands) -> Self {
        Self {
            window: RollingWindow::new(period),
            rsi: WilderRsi::new(period, bands),
        }
    }

    /// Fold one trade price into this instrument's state. `None` until the
    /// first delta exists and the estimator is warm.
    pub fn on_price(&mut self, price: f64) -> Option<RsiReading> {
        self.window.push(price).and_then(|d| self.rsi.update(d))
    }
}

pub struct InstrumentTable {
    entries: DashMap<String, Arc<Mutex<InstrumentState>>>,
    period: usize,
    bands: RsiBands,
}

impl InstrumentTable {
    pub fn new(period: usize, bands: RsiBands) -> Self {
        Self {
            entries: DashMap::new(),
            period,
            bands,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Exclusive handle to the instrument's state, creating it on first
    /// touch. Creation is idempotent under concurrent callers: one creator
    /// wins, the rest observe its entry.
    pub fn get_or_create(&self, token: &str) -> Arc<Mutex<InstrumentState>> {
        self.entries
            .entry(token.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(InstrumentState::new(self.period, self.bands))))
            .value()
            .clone()
    }

    /// Number of instruments observed so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::models::Signal;

    fn table() -> InstrumentTable {
        InstrumentTable::new(14, RsiBands::default())
    }

    /// Reference: one instrument run through its own private state.
    fn reference_readings(prices: &[f64]) -> Vec<f64> {
        let mut state = InstrumentState::new(14, RsiBands::default());
        prices
            .iter()
            .filter_map(|&p| state.on_price(p).map(|r| r.value))
            .collect()
    }

    #[test]
    fn first_touch_creates_once() {
        let t = table();

        let a = t.get_or_create("EQAAA");
        let b = t.get_or_create("EQAAA");

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn interleaved_instruments_do_not_cross_contaminate() {
        let t = table();

        // A rises, B falls. Interleave their trades through the shared
        // table and compare against independent single-instrument runs.
        let a_prices: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let b_prices: Vec<f64> = (1..=20).rev().map(|i| i as f64).collect();

        let mut a_seen = Vec::new();
        let mut b_seen = Vec::new();

        for (pa, pb) in a_prices.iter().zip(&b_prices) {
            if let Some(r) = t.get_or_create("A").lock().on_price(*pa) {
                a_seen.push(r.value);
            }
            if let Some(r) = t.get_or_create("B").lock().on_price(*pb) {
                b_seen.push(r.value);
            }
        }

        assert_eq!(a_seen, reference_readings(&a_prices));
        assert_eq!(b_seen, reference_readings(&b_prices));
        assert!(a_seen.iter().all(|&v| v == 100.0));
        assert!(b_seen.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn concurrent_first_touch_yields_one_entry() {
        let t = Arc::new(table());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        t.get_or_create("EQHOT").lock().on_price(1.0);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(t.len(), 1);
        // 800 flat prices: warm, and flat reads exactly 50.
        let state = t.get_or_create("EQHOT");
        let guard = state.lock();
        assert!(guard.rsi.is_warm());
        assert_eq!(guard.rsi.value(), Some(50.0));
        assert_eq!(guard.window.len(), 15);
    }

    #[test]
    fn reading_signals_follow_band_config() {
        let t = InstrumentTable::new(
            14,
            RsiBands {
                oversold: 30.0,
                overbought: 70.0,
            },
        );

        let state = t.get_or_create("EQUP");
        let mut guard = state.lock();
        let mut last = None;
        for p in 1..=15 {
            last = guard.on_price(p as f64);
        }

        assert_eq!(last.unwrap().signal, Signal::Overbought);
    }
}
