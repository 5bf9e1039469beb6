//! Jittered exponential backoff for polling.

use std::time::Duration;
use rand::Rng;
use tokio::time::Instant;

/// Delay schedule for polling a remote state machine until a deadline.
///
/// Delays double from `base` up to `max`, each with up to 10% jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    base: Duration,
    max: Duration,
    deadline: Instant,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, budget: Duration) -> Self {
        Self {
            attempt: 0,
            base,
            max,
            deadline: Instant::now() + budget,
        }
    }

    /// Sleep for the next delay. Returns `false` once the budget is spent.
    pub async fn wait(&mut self) -> bool {
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        let delay = self.next_delay().min(self.deadline - now);
        tokio::time::sleep(delay).await;
        true
    }

    /// Number of delays handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        let delay = self.base.saturating_mul(factor).min(self.max);
        let jitter_ms = delay.as_millis() as u64 / 10;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}
