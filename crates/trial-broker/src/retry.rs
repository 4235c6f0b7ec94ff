// crates/trial-broker/src/retry.rs
// ============================================================================
// Module: Per-Trial Retry Budget
// Description: Exponential backoff retry, scoped to a single trial's work.
// Purpose: Retry a transient per-trial store failure without letting one
//          flaky trial exhaust retries another trial in the same batch
//          would otherwise have available.
// Dependencies: std::time
// Grounded on: spec.md §5 ("retries: transient HTTP failures retry with
//              exponential backoff min(2^n, 30)s, n<=3; per-batch the retry
//              budget is not shared across trials") and
//              trial-providers::registry::HttpRegistryClient::send_with_retry
//              for the same backoff shape applied at the registry layer.
// ============================================================================

use std::time::Duration;

/// Maximum number of retry attempts for one trial's retryable work.
pub const MAX_RETRIES: u32 = 3;
/// Cap on the exponential backoff delay.
const MAX_BACKOFF_SECS: u64 = 30;

/// Returns the backoff delay for retry attempt `attempt` (0-indexed):
/// `min(2^attempt, 30)` seconds.
#[must_use]
pub fn backoff_duration(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(MAX_BACKOFF_SECS))
}

/// Runs `op` up to `MAX_RETRIES + 1` times, sleeping an exponentially
/// growing backoff between attempts, as long as `is_transient` classifies
/// the error as retryable. A fresh [`RetryBudget`] is constructed per trial
/// so one trial's retries never borrow against another's.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryBudget {
    attempts_used: u32,
}

impl RetryBudget {
    /// Creates a budget with the full retry allowance available.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `op`, retrying while `is_transient(&err)` holds and the budget
    /// has attempts remaining. Returns the first success or the last error
    /// once the budget is exhausted or the error is classified permanent.
    pub fn retry<T, E>(&mut self, mut op: impl FnMut() -> Result<T, E>, is_transient: impl Fn(&E) -> bool) -> Result<T, E> {
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && self.attempts_used < MAX_RETRIES => {
                    std::thread::sleep(backoff_duration(self.attempts_used));
                    self.attempts_used += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::RetryBudget;
    use super::backoff_duration;

    #[test]
    fn backoff_grows_then_caps() {
        assert_eq!(backoff_duration(0).as_secs(), 1);
        assert_eq!(backoff_duration(1).as_secs(), 2);
        assert_eq!(backoff_duration(2).as_secs(), 4);
        assert_eq!(backoff_duration(10).as_secs(), 30);
    }

    #[test]
    fn retry_stops_on_permanent_error() {
        let attempts = Cell::new(0);
        let mut budget = RetryBudget::new();
        let result: Result<(), &str> = budget.retry(
            || {
                attempts.set(attempts.get() + 1);
                Err("permanent")
            },
            |_| false,
        );
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn retry_exhausts_budget_then_returns_last_error() {
        let attempts = Cell::new(0);
        let mut budget = RetryBudget::new();
        let result: Result<(), &str> = budget.retry(
            || {
                attempts.set(attempts.get() + 1);
                Err("transient")
            },
            |_| true,
        );
        assert!(result.is_err());
        assert_eq!(attempts.get(), 4);
    }

    #[test]
    fn retry_succeeds_after_transient_failures() {
        let attempts = Cell::new(0);
        let mut budget = RetryBudget::new();
        let result = budget.retry(
            || {
                attempts.set(attempts.get() + 1);
                if attempts.get() < 3 { Err("transient") } else { Ok(42) }
            },
            |_| true,
        );
        assert_eq!(result, Ok(42));
    }
}
