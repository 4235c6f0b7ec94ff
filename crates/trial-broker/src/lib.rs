// crates/trial-broker/src/lib.rs
// ============================================================================
// Module: Trial Broker Library
// Description: Public API surface for batch ingestion orchestration and
//              score assembly.
// Purpose: Own the I/O-facing scheduling that the pure trial-engine crate
//          deliberately has none of.
// Dependencies: trial-config, trial-core, trial-engine, trial-store-sqlite
// ============================================================================

//! ## Overview
//! `trial-broker` is the orchestration crate: it drives
//! [`trial_providers::HttpRegistryClient`]-shaped collaborators through a
//! full ingestion batch, and assembles a scored, persisted run from the
//! engine's pure gate/posterior output. It mirrors the teacher's
//! `decision-gate-broker` composite-dispatcher shape — one pluggable
//! collaborator driving per-item work, with a single item's failure
//! collected rather than aborting the batch — generalized to this domain's
//! per-trial retry and cooperative-cancellation requirements (`spec.md` §5).

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cancellation;
pub mod ingest;
pub mod retry;
pub mod scoring;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cancellation::CancellationToken;
pub use ingest::IngestBatchReport;
pub use ingest::IngestError;
pub use ingest::IngestOrchestrator;
pub use ingest::TrialIngestError;
pub use ingest::TrialIngestOutcome;
pub use retry::MAX_RETRIES;
pub use retry::RetryBudget;
pub use retry::backoff_duration;
pub use scoring::score_and_persist;
