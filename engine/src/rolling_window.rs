use std::collections::VecDeque;

/// Gain/loss classification of one price step.
///
/// Exactly one of the two fields is non-zero unless the step was flat, in
/// which case both are zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceDelta {
    pub gain: f64,
    pub loss: f64,
}

/// Fixed-capacity buffer of the most recent `period + 1` prices for one
/// instrument. Eviction is FIFO; only prices are retained, never full
/// event payloads.
#[derive(Debug)]
pub struct RollingWindow {
    prices: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(period: usize) -> Self {
        let capacity = period + 1;
        Self {
            prices: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a price. Returns the gain/loss pair against the previous
    /// price, or `None` for the very first push. Never fails.
    pub fn push(&mut self, price: f64) -> Option<PriceDelta> {
        let delta = self.prices.back().map(|prev| {
            let step = price - prev;
            PriceDelta {
                gain: step.max(0.0),
                loss: (-step).max(0.0),
            }
        });

        self.prices.push_back(price);
        if self.prices.len() > self.capacity {
            self.prices.pop_front();
        }

        delta
    }

    pub fn latest(&self) -> Option<f64> {
        self.prices.back().copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
