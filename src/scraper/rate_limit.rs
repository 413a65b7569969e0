//! Delay gate between consecutive automated requests.

use rand::RngExt;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Enforces a minimum interval (plus random jitter) since the previous call
/// returned. A pure delay gate — no quota tracking, no failure mode.
pub struct RateLimiter {
    min_interval: Duration,
    jitter_ms: u64,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, jitter_ms: u64) -> Self {
        Self {
            min_interval,
            jitter_ms,
            last: None,
        }
    }

    /// Block until the configured interval has elapsed since the previous
    /// `wait()` returned. The first call never blocks.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            let jitter = if self.jitter_ms > 0 {
                rand::rng().random_range(0..=self.jitter_ms)
            } else {
                0
            };
            let target = self.min_interval + Duration::from_millis(jitter);
            let elapsed = last.elapsed();
            if elapsed < target {
                sleep(target - elapsed).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_call_never_blocks() {
        let mut limiter = RateLimiter::new(Duration::from_secs(5), 0);
        let before = Instant::now();
        limiter.wait().await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_calls_are_spaced() {
        let mut limiter = RateLimiter::new(Duration::from_millis(1500), 0);
        limiter.wait().await;
        let after_first = Instant::now();
        limiter.wait().await;
        assert!(Instant::now() - after_first >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_time_counts_toward_the_interval() {
        let mut limiter = RateLimiter::new(Duration::from_millis(1000), 0);
        limiter.wait().await;
        sleep(Duration::from_millis(400)).await;
        let before = Instant::now();
        limiter.wait().await;
        assert_eq!(Instant::now() - before, Duration::from_millis(600));
    }
}
