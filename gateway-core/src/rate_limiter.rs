//! Token-bucket rate limiter for trusted-node requests: spec.md §4.2.4, §5.
//!
//! Not present in the teacher; built with the same shared-state idiom the
//! teacher uses for its stats cache (`parking_lot::RwLock` guarding a plain
//! struct, mutated under a short critical section, with backoff sleeps
//! happening outside the lock).

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;

struct Bucket {
    credits: f64,
    capacity: f64,
    rate_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.credits = (self.credits + elapsed * self.rate_per_sec).min(self.capacity);
        self.last_refill = now;
    }
}

/// Rate-limits outbound requests to the configured trusted node.
///
/// `rate_per_sec` is `max_rps`; `capacity` is `max_rps * burst_multiplier`
/// (spec.md §4.2.4: "burst up to 300 × rate").
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(rate_per_sec: f64, burst_multiplier: f64) -> Self {
        let capacity = rate_per_sec * burst_multiplier;
        Self {
            bucket: Mutex::new(Bucket {
                credits: capacity,
                capacity,
                rate_per_sec,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Blocks cooperatively until at least one credit is available, then
    /// debits it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock();
                bucket.refill();
                if bucket.credits >= 1.0 {
                    bucket.credits -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.credits;
                    Some(Duration::from_secs_f64(deficit / bucket.rate_per_sec))
                }
            };
            match wait {
                None => return,
                Some(d) => sleep(d.max(Duration::from_millis(1))).await,
            }
        }
    }

    /// Debits the bucket by `2^attempt` following an HTTP 429, per spec.md
    /// §4.2.4's exponential backoff rule.
    pub fn debit_for_retry(&self, attempt: u32) {
        let mut bucket = self.bucket.lock();
        bucket.refill();
        let debit = 2f64.powi(attempt as i32);
        bucket.credits = (bucket.credits - debit).max(0.0);
    }
}
