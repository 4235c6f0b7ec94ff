// crates/trial-providers/src/rate_limit.rs
// ============================================================================
// Module: Token Bucket Rate Limiter
// Description: Blocking token-bucket limiter for outbound registry requests.
// Purpose: Bound request rate without an async runtime.
// Dependencies: std::time
// ============================================================================

//! ## Overview
//! [`TokenBucket`] enforces `requests` permits per `window` by blocking the
//! calling thread until a permit is available. It has no suspension points of
//! its own beyond the sleep it issues, so callers checking a cancellation
//! token between requests (per the concurrency model's suspension-point
//! discipline) remain responsive.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Token Bucket
// ============================================================================

/// A blocking token-bucket rate limiter.
///
/// # Invariants
/// - At most `capacity` permits are available at any instant.
/// - Permits refill continuously at `capacity / window` per unit time.
pub struct TokenBucket {
    /// Mutable refill state, guarded for use across threads.
    state: Mutex<BucketState>,
    /// Maximum permits held at once.
    capacity: f64,
    /// Refill rate in permits per second.
    refill_per_sec: f64,
}

/// Mutable token-bucket state.
struct BucketState {
    /// Currently available permits.
    tokens: f64,
    /// Last time the bucket was refilled.
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a bucket allowing `requests` permits per `window`, starting
    /// full.
    #[must_use]
    pub fn new(requests: u32, window: Duration) -> Self {
        let capacity = f64::from(requests.max(1));
        let window_secs = window.as_secs_f64().max(0.001);
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_sec: capacity / window_secs,
        }
    }

    /// Blocks the calling thread until one permit is available, then
    /// consumes it.
    pub fn acquire(&self) {
        loop {
            let wait = {
                let mut state =
                    self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                state.refill(self.capacity, self.refill_per_sec);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };
            match wait {
                None => return,
                Some(duration) => std::thread::sleep(duration),
            }
        }
    }
}

impl BucketState {
    /// Adds elapsed-time-scaled permits back into the bucket, capped at
    /// `capacity`.
    fn refill(&mut self, capacity: f64, refill_per_sec: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::TokenBucket;
    use std::time::Duration;
    use std::time::Instant;

    #[test]
    fn acquire_does_not_block_within_capacity() {
        let bucket = TokenBucket::new(5, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..5 {
            bucket.acquire();
        }
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn acquire_blocks_once_capacity_is_exhausted() {
        let bucket = TokenBucket::new(2, Duration::from_millis(100));
        bucket.acquire();
        bucket.acquire();
        let start = Instant::now();
        bucket.acquire();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
