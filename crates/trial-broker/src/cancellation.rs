// crates/trial-broker/src/cancellation.rs
// ============================================================================
// Module: Cooperative Cancellation
// Description: A shared, cloneable cancellation flag checked at suspension
//              points.
// Purpose: Let an external caller ask a running batch to stop between
//          trials without tearing down the orchestrator.
// Dependencies: std::sync
// Grounded on: spec.md §5 ("cancellation is cooperative: tasks check a
//              cancellation token at every suspension point")
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// A cloneable, cooperative cancellation flag.
///
/// Cloning shares the same underlying flag; setting it from any clone is
/// visible to every other clone and the orchestrator holding one.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that has not yet been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::CancellationToken;

    #[test]
    fn cancellation_is_visible_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn fresh_token_is_not_cancelled() {
        assert!(!CancellationToken::new().is_cancelled());
    }
}
