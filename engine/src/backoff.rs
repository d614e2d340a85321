use std::time::Duration;

use rand::Rng;

/// Exponential backoff with a cap and ±20% jitter.
///
/// `attempt` is 1-based: attempt 1 sleeps around `base`, attempt 2 around
/// `2 * base`, and so on up to `cap`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let raw = self
            .base
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.cap);

        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        raw.mul_f64(jitter)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}
