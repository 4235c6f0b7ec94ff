// crates/trial-providers/src/lib.rs
// ============================================================================
// Module: Trial Providers
// Description: HTTP-backed collaborators for registry access and document
//              fetching, plus environment-variable loading.
// Purpose: Provide the smallest faithful default implementations of the
//          registry client and document fetcher trait contracts.
// Dependencies: trial-core, reqwest, url
// ============================================================================

//! ## Overview
//! This crate supplies the outward-facing network collaborators the engine
//! and broker depend on through `trial-core`'s trait contracts: a paginated,
//! rate-limited registry client and a size-bounded document fetcher. It also
//! exposes `env` for reading the handful of named environment variables the
//! workspace depends on at startup.

pub mod env;
pub mod fetch;
pub mod rate_limit;
pub mod registry;

pub use fetch::HttpDocumentFetcher;
pub use fetch::HttpDocumentFetcherConfig;
pub use rate_limit::TokenBucket;
pub use registry::HttpRegistryClient;
pub use registry::HttpRegistryClientConfig;
pub use registry::PageFetchOutcome;

#[cfg(test)]
mod tests;
