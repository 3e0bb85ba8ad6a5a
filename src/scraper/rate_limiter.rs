//! Navigation pacing: token bucket plus a jittered pause.
//!
//! The portal is a public government site; every navigation, retries
//! included, goes through [`RateLimiter::acquire`].

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Token bucket rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<Bucket>>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    /// tokens per second
    refill_rate: f64,
    last_refill: Instant,
    min_pause: Duration,
    max_pause: Duration,
}

impl Bucket {
    /// Take a token at `now` and return how long the caller must wait.
    fn take(&mut self, now: Instant, jitter: f64) -> Duration {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            let spread = self.max_pause.saturating_sub(self.min_pause);
            self.min_pause + spread.mul_f64(jitter.clamp(0.0, 1.0))
        } else {
            let wait = (1.0 - self.tokens) / self.refill_rate;
            self.tokens = 0.0;
            Duration::from_secs_f64(wait) + self.min_pause
        }
    }
}

impl RateLimiter {
    /// `requests_per_minute` bounds the sustained rate; every navigation
    /// also waits a random pause in `[min_delay_secs, max_delay_secs]`.
    pub fn new(requests_per_minute: u32, min_delay_secs: f64, max_delay_secs: f64) -> Self {
        let capacity = requests_per_minute.max(1) as f64;
        let min_pause = Duration::from_secs_f64(min_delay_secs.max(0.0));
        let max_pause = Duration::from_secs_f64(max_delay_secs.max(0.0)).max(min_pause);

        Self {
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: capacity,
                capacity,
                refill_rate: capacity / 60.0,
                last_refill: Instant::now(),
                min_pause,
                max_pause,
            })),
        }
    }

    /// Wait until the next navigation is allowed
    pub async fn acquire(&self) {
        let delay = self.bucket.lock().await.take(Instant::now(), jitter());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Pseudo-random factor in [0, 1) from the clock's sub-second part
fn jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(per_minute: f64, min_ms: u64, max_ms: u64) -> Bucket {
        Bucket {
            tokens: per_minute,
            capacity: per_minute,
            refill_rate: per_minute / 60.0,
            last_refill: Instant::now(),
            min_pause: Duration::from_millis(min_ms),
            max_pause: Duration::from_millis(max_ms),
        }
    }

    #[test]
    fn test_pause_within_bounds() {
        let mut b = bucket(60.0, 500, 1000);
        let now = b.last_refill;
        assert_eq!(b.take(now, 0.0), Duration::from_millis(500));
        assert_eq!(b.take(now, 1.0), Duration::from_millis(1000));
        assert_eq!(b.take(now, 0.5), Duration::from_millis(750));
    }

    #[test]
    fn test_empty_bucket_waits_for_refill() {
        // One request per second
        let mut b = bucket(60.0, 0, 0);
        b.tokens = 0.0;
        let now = b.last_refill;
        assert_eq!(b.take(now, 0.0), Duration::from_secs(1));

        // A full second later a token is back
        let later = now + Duration::from_secs(1);
        assert_eq!(b.take(later, 0.0), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_fast_limiter_does_not_block() {
        let limiter = RateLimiter::new(6000, 0.0, 0.0);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
