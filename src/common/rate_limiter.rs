//! Fixed-window request limiter
//!
//! Hands out at most `max_requests` permits per window; callers that find the
//! window exhausted sleep until it rolls over.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

/// Shared request budget; clones draw from the same window
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Arc<Mutex<Window>>,
    max_requests: u32,
    period: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, period: Duration) -> Self {
        Self {
            window: Arc::new(Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            })),
            max_requests: max_requests.max(1),
            period,
        }
    }

    /// `requests_per_second` permits per one-second window
    pub fn per_second(requests_per_second: u32) -> Self {
        Self::new(requests_per_second, Duration::from_secs(1))
    }

    /// Wait for a permit
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let elapsed = window.started.elapsed();
                if elapsed >= self.period {
                    window.started = Instant::now();
                    window.used = 0;
                }
                if window.used < self.max_requests {
                    window.used += 1;
                    return;
                }
                self.period.saturating_sub(elapsed)
            };
            tracing::trace!(wait_ms = wait.as_millis() as u64, "Rate limit reached");
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_budget_is_not_delayed() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_next_window() {
        let limiter = RateLimiter::new(1, Duration::from_millis(500));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clone_shares_budget() {
        let limiter = RateLimiter::per_second(1);
        let other = limiter.clone();

        let start = Instant::now();

        limiter.acquire().await;
        other.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_still_grants_one_permit() {
        let limiter = RateLimiter::per_second(0);
        let start = Instant::now();

        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
