//! A rolling-window start limiter: at most `max_starts` calls to
//! [`RateLimiter::wait`] may return within any `period` window, measured
//! from the grant timestamp of each past call.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub struct RateLimiter {
    max_starts: usize,
    period: Duration,
    starts: Mutex<Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(max_starts: usize, period: Duration) -> Self {
        Self {
            max_starts,
            period,
            starts: Mutex::new(Vec::with_capacity(max_starts)),
        }
    }

    /// Block until a slot is available, then record this call's grant
    /// timestamp and return how long the caller waited (zero if it was not
    /// throttled).
    pub async fn wait(&self) -> Duration {
        let mut waited = Duration::ZERO;

        loop {
            let now = Instant::now();
            let sleep_for = {
                let mut starts = self.starts.lock().expect("rate limiter mutex poisoned");
                starts.retain(|t| now.duration_since(*t) < self.period);

                if starts.len() < self.max_starts {
                    starts.push(now);
                    None
                } else {
                    let oldest = starts[0];
                    Some(self.period.saturating_sub(now.duration_since(oldest)))
                }
            };

            match sleep_for {
                None => return waited,
                Some(d) => {
                    let d = d.max(Duration::from_millis(1));
                    tokio::time::sleep(d).await;
                    waited += d;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn permits_up_to_max_starts_immediately() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert_eq!(limiter.wait().await, Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn throttles_once_window_is_full() {
        let limiter = std::sync::Arc::new(RateLimiter::new(1, Duration::from_secs(10)));
        assert_eq!(limiter.wait().await, Duration::ZERO);

        let handle = tokio::spawn({
            let limiter = std::sync::Arc::clone(&limiter);
            async move { limiter.wait().await }
        });

        tokio::time::advance(Duration::from_secs(10)).await;
        let waited = handle.await.unwrap();
        assert!(waited > Duration::ZERO);
    }
}
