use rand::Rng;
use std::time::Duration;

use crate::RetryConfig;

/// Exponential backoff generator: `min * factor^attempt`, capped at `max`.
///
/// With a non-zero jitter the delay is moved up or down by a random share
/// of itself (at most `jitter * delay`) before the cap is applied.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
    attempts: u32,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            factor: 2.0,
            jitter: 0.0,
            attempts: 0,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.min_delay, config.max_delay)
            .with_factor(config.factor)
            .with_jitter(config.jitter)
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor.max(1.0);
        self
    }

    /// Jitter as a fraction of the delay, clamped to `0.0..=1.0`
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay for the current attempt; advances the counter
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.factor.powi(self.attempts.min(64) as i32);
        self.attempts = self.attempts.saturating_add(1);

        let mut ms = self.min.as_millis() as f64 * exp;
        if self.jitter > 0.0 {
            let mut rng = rand::thread_rng();
            let deviation = (rng.gen::<f64>() * self.jitter * ms).floor();
            ms = if rng.gen_bool(0.5) { ms - deviation } else { ms + deviation };
        }

        let capped = ms.min(self.max.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_millis(20_000))
    }
}
