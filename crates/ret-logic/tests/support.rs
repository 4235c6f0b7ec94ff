// crates/ret-logic/tests/support.rs
// ============================================================================
// Module: Test Support
// Description: Shared helpers for the integration test suite.
// Purpose: Give tests a `Result`-returning assertion path instead of panics.
// Dependencies: std::error::Error
// ============================================================================

//! ## Overview
//! Integration tests in this crate return `TestResult` rather than panicking,
//! so assertion failures surface through the normal `?` error path and the
//! test harness prints the failing message instead of a panic backtrace.

#![allow(dead_code, reason = "not every test file exercises every helper")]

use std::error::Error;
use std::fmt;

/// Result type used by integration tests in this crate.
pub type TestResult = Result<(), Box<dyn Error>>;

/// A plain assertion failure carrying only a message.
#[derive(Debug)]
struct AssertionFailed(String);

impl fmt::Display for AssertionFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for AssertionFailed {}

/// Returns `Ok(())` when `condition` holds, otherwise an error carrying `message`.
pub fn ensure(condition: bool, message: impl Into<String>) -> TestResult {
    if condition {
        Ok(())
    } else {
        Err(Box::new(AssertionFailed(message.into())))
    }
}
