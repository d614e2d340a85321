//! Wilder RSI estimator.
//!
//! Maintains exponentially smoothed average gain/loss over the deltas
//! produced by a [`RollingWindow`](crate::rolling_window::RollingWindow).
//!
//! ## Phases
//!
//! - Warm-up (`seen < period`): simple sums of gains and losses accumulate.
//!   No value is produced; the instrument is cold and the ingest loop
//!   suppresses publication.
//! - At `seen == period` the sums become simple averages and the estimator
//!   turns warm, producing its first reading.
//! - Steady state: Wilder's recursion
//!   `avg = (avg * (period - 1) + x) / period`, which never re-scans the
//!   window.
//!
//! ## Value derivation
//!
//! - both averages zero → RSI = 50 (flat market, neutral by convention)
//! - `avg_loss == 0`, `avg_gain > 0` → RSI = 100
//! - otherwise `RSI = 100 - 100 / (1 + avg_gain / avg_loss)`
//!
//! The result is always within [0, 100] once warm.

use corelib::models::Signal;

use crate::rolling_window::PriceDelta;

/// Classification thresholds. Configuration, not constants: deployments
/// tune these per market regime.
#[derive(Debug, Clone, Copy)]
pub struct RsiBands {
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiBands {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

/// One warm RSI observation.
#[derive(Debug, Clone, Copy)]
pub struct RsiReading {
    pub value: f64,
    pub signal: Signal,
}

#[derive(Debug)]
pub struct WilderRsi {
    period: usize,
    bands: RsiBands,
    avg_gain: f64,
    avg_loss: f64,
    seen: usize,
}

impl WilderRsi {
    pub fn new(period: usize, bands: RsiBands) -> Self {
        debug_assert!(period > 0, "RSI period must be positive");
        Self {
            period,
            bands,
            avg_gain: 0.0,
            avg_loss: 0.0,
            seen: 0,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Warm once `period` deltas have been observed.
    pub fn is_warm(&self) -> bool {
        self.seen >= self.period
    }

    /// Fold one delta into the smoothed state. Returns a reading once
    /// warm, `None` while still in warm-up.
    pub fn update(&mut self, delta: PriceDelta) -> Option<RsiReading> {
        if self.seen < self.period {
            // Warm-up: plain sums, divided out when the period completes.
            self.avg_gain += delta.gain;
            self.avg_loss += delta.loss;
            self.seen += 1;

            if self.seen == self.period {
                self.avg_gain /= self.period as f64;
                self.avg_loss /= self.period as f64;
                return Some(self.reading());
            }
            return None;
        }

        let p = self.period as f64;
        self.avg_gain = (self.avg_gain * (p - 1.0) + delta.gain) / p;
        self.avg_loss = (self.avg_loss * (p - 1.0) + delta.loss) / p;
        self.seen += 1;

        Some(self.reading())
    }

    /// Current value without mutating state. `None` while cold.
    pub fn value(&self) -> Option<f64> {
        if !self.is_warm() {
            return None;
        }

        let value = if self.avg_loss == 0.0 && self.avg_gain == 0.0 {
            50.0
        } else if self.avg_loss == 0.0 {
            100.0
        } else {
            let rs = self.avg_gain / self.avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        };

        Some(value)
    }

    fn reading(&self) -> RsiReading {
        // Only called once warm.
        let value = self.value().unwrap_or(50.0);

        let signal = if value < self.bands.oversold {
            Signal::Oversold
        } else if value > self.bands.overbought {
            Signal::Overbought
        } else {
            Signal::Neutral
        };

        RsiReading { value, signal }
    }
}
