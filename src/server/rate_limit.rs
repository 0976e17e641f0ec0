use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Token bucket shared by every tool invocation. A request draws one token;
/// when the bucket is empty the caller waits for the refill instead of
/// getting an error.
#[derive(Debug)]
pub struct RateLimiter {
    rps: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug, Clone, Copy)]
struct BucketState {
    tokens: f64,
    refreshed: Instant,
}

impl RateLimiter {
    /// `rps` must be positive; [`crate::config::ServerSettings::effective_rate_limit`]
    /// only ever yields positive rates.
    pub fn new(rps: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rps,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                refreshed: Instant::now(),
            }),
        }
    }

    pub async fn acquire(&self) {
        loop {
            match self.try_take().await {
                None => return,
                Some(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Takes a token if one is available, otherwise reports how long until
    /// the next token accrues.
    async fn try_take(&self) -> Option<Duration> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.tokens = refill(
            state.tokens,
            self.burst,
            self.rps,
            now.duration_since(state.refreshed),
        );
        state.refreshed = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return None;
        }
        let deficit = 1.0 - state.tokens;
        Some(Duration::try_from_secs_f64(deficit / self.rps).unwrap_or(Duration::from_secs(1)))
    }
}

fn refill(tokens: f64, burst: f64, rps: f64, elapsed: Duration) -> f64 {
    (tokens + elapsed.as_secs_f64() * rps).min(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refill_never_exceeds_burst_capacity() {
        assert_eq!(refill(1.0, 5.0, 10.0, Duration::from_secs(60)), 5.0);
    }

    #[test]
    fn refill_accrues_fractional_tokens() {
        let tokens = refill(0.0, 5.0, 2.0, Duration::from_millis(250));
        assert!((tokens - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn burst_capacity_is_served_without_waiting() {
        let limiter = RateLimiter::new(1.0, 3);
        let started = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn an_empty_bucket_waits_for_the_refill() {
        let limiter = RateLimiter::new(50.0, 2);
        let started = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        // The third token accrues after 1/50s.
        assert!(started.elapsed() >= Duration::from_millis(15));
    }
}
