//! Timed waits between no-fork retries
//!
//! The sleep primitive is injected so the retry loop can be tested
//! without real timers.

use crate::config::NoForkConfig;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Scheduled wakeup.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Randomized exponential backoff.
///
/// Round `n` (starting at 1) waits `base * 2^(n-1)`, scaled by a factor drawn
/// uniformly from `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    jitter: f64,
    round: u32,
}

impl Backoff {
    pub fn new(base: Duration, jitter: f64) -> Self {
        Self {
            base,
            jitter: jitter.clamp(0.0, 1.0),
            round: 0,
        }
    }

    pub fn from_config(config: &NoForkConfig) -> Self {
        Self::new(Duration::from_millis(config.base_wait_ms), config.jitter)
    }

    /// Delay before the next retry.
    pub fn next_delay(&mut self) -> Duration {
        self.round = self.round.saturating_add(1);
        let factor = if self.jitter > 0.0 {
            rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter))
        } else {
            1.0
        };
        let exp = 2f64.powi((self.round - 1).min(30) as i32);
        self.base.mul_f64(exp * factor)
    }

    pub fn rounds(&self) -> u32 {
        self.round
    }
}
