// crates/trial-core/src/interfaces/mod.rs
// ============================================================================
// Module: Trial Core Interfaces
// Description: Backend-agnostic interfaces for registry access, storage, and
//              optional LLM-assisted resolution.
// Purpose: Define the contract surfaces the engine and broker program against.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the engine integrates with external systems without
//! embedding backend-specific details. Implementations must be deterministic
//! with respect to their inputs and fail closed on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::CompanyId;
use crate::core::DocumentId;
use crate::core::NctId;
use crate::core::ResolverDecisionRecord;
use crate::core::ResolverLabel;
use crate::core::ResolverReviewItem;
use crate::core::ReviewItemId;
use crate::core::RunId;
use crate::core::ScoreResult;
use crate::core::StudyCard;
use crate::core::TrialId;
use crate::core::TrialVersion;

// ============================================================================
// SECTION: Registry Client
// ============================================================================

/// Registry client errors (`spec.md` §4.1, §7).
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A transient network/HTTP error; the caller should retry with backoff.
    #[error("transient registry fetch error: {0}")]
    Transient(String),
    /// The registry signaled a rate limit; the caller should back off the
    /// suggested duration before retrying.
    #[error("registry rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retrying, if the registry supplied one.
        retry_after_secs: u64,
    },
    /// A permanent error (4xx other than 429, malformed response shape);
    /// retrying will not help.
    #[error("permanent registry fetch error: {0}")]
    Permanent(String),
}

/// One page of raw registry records plus an opaque continuation token.
#[derive(Debug, Clone)]
pub struct RegistryPage {
    /// Raw JSON records for this page, verbatim from the registry.
    pub records: Vec<serde_json::Value>,
    /// Opaque token for the next page; `None` when this is the last page.
    pub next_page_token: Option<String>,
}

/// Paginated, rate-limited access to the upstream trial registry.
pub trait RegistryClient {
    /// Fetches one page of trial records, starting from `page_token` (or the
    /// first page when `None`).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] per the taxonomy above.
    fn fetch_page(&self, page_token: Option<&str>) -> Result<RegistryPage, RegistryError>;
}

// ============================================================================
// SECTION: Document Fetcher / Study Card Extractor
// ============================================================================

/// Document fetch errors.
#[derive(Debug, Error)]
pub enum DocumentFetchError {
    /// A transient network error.
    #[error("transient document fetch error: {0}")]
    Transient(String),
    /// A permanent error (404, disallowed scheme, oversized response).
    #[error("permanent document fetch error: {0}")]
    Permanent(String),
}

/// Fetches a document's raw bytes given a URL.
pub trait DocumentFetcher {
    /// Fetches the document at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentFetchError`] when the fetch cannot be completed.
    fn fetch(&self, url: &str) -> Result<FetchedDocument, DocumentFetchError>;
}

/// The raw bytes and metadata returned by a [`DocumentFetcher`].
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Raw response bytes.
    pub bytes: Vec<u8>,
    /// Content type as reported by the fetcher.
    pub content_type: String,
}

/// Study-card extraction errors.
#[derive(Debug, Error)]
pub enum StudyCardExtractorError {
    /// The extractor's output failed schema validation.
    #[error("study card failed schema validation: {0}")]
    SchemaInvalid(String),
    /// The extractor returned a numeric value without a supporting evidence
    /// span; such extractions are rejected rather than silently dropped.
    #[error("extracted numeric value without an evidence span: {field}")]
    MissingEvidenceSpan {
        /// The field that was missing its evidence span.
        field: String,
    },
    /// The extractor backend itself failed (timeout, malformed response).
    #[error("study card extraction backend error: {0}")]
    Backend(String),
}

/// Extracts a structured [`StudyCard`] from a fetched document's text.
pub trait StudyCardExtractor {
    /// Extracts a study card from `text`, rejecting extractions that fail
    /// schema validation or carry an unsupported numeric value.
    ///
    /// # Errors
    ///
    /// Returns [`StudyCardExtractorError`] per the taxonomy above.
    fn extract(
        &self,
        document_id: DocumentId,
        text: &str,
    ) -> Result<StudyCard, StudyCardExtractorError>;
}

// ============================================================================
// SECTION: Version Store / Change Detector
// ============================================================================

/// Version store errors.
#[derive(Debug, Error)]
pub enum VersionStoreError {
    /// The underlying storage backend reported an error.
    #[error("version store backend error: {0}")]
    Backend(String),
    /// The trial referenced does not exist.
    #[error("unknown trial: {0}")]
    UnknownTrial(TrialId),
}

/// Persists append-only trial versions and detects changes between them.
pub trait VersionStore {
    /// Records `raw` as a new version of `trial_id` iff its content hash
    /// differs from the most recent prior version, returning the version
    /// that resulted (existing, unchanged, or newly appended) and whether a
    /// new row was actually appended.
    ///
    /// # Errors
    ///
    /// Returns [`VersionStoreError`] on storage failure.
    fn record_version(
        &self,
        trial_id: TrialId,
        raw: serde_json::Value,
    ) -> Result<(TrialVersion, bool), VersionStoreError>;

    /// Returns the most recent version recorded for `trial_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`VersionStoreError`] on storage failure.
    fn latest_version(
        &self,
        trial_id: TrialId,
    ) -> Result<Option<TrialVersion>, VersionStoreError>;
}

// ============================================================================
// SECTION: Resolver Store
// ============================================================================

/// Resolver store errors.
#[derive(Debug, Error)]
pub enum ResolverStoreError {
    /// The underlying storage backend reported an error.
    #[error("resolver store backend error: {0}")]
    Backend(String),
    /// The referenced review item does not exist.
    #[error("unknown review item: {0}")]
    UnknownReviewItem(ReviewItemId),
}

/// Persists resolver decisions, review-queue items, and calibration labels.
pub trait ResolverStore {
    /// Writes an accept decision. Errors if a decision already exists for
    /// this `(run_id, nct_id)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverStoreError`] on storage failure or duplicate write.
    fn write_decision(&self, decision: &ResolverDecisionRecord) -> Result<(), ResolverStoreError>;

    /// Writes a new review-queue item and returns its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverStoreError`] on storage failure.
    fn write_review_item(
        &self,
        item: &ResolverReviewItem,
    ) -> Result<ReviewItemId, ResolverStoreError>;

    /// Returns pending review items ordered by creation time, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverStoreError`] on storage failure.
    fn list_pending_reviews(
        &self,
        limit: usize,
    ) -> Result<Vec<ResolverReviewItem>, ResolverStoreError>;

    /// Marks a review item resolved.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverStoreError::UnknownReviewItem`] if absent.
    fn mark_review_resolved(&self, id: ReviewItemId) -> Result<(), ResolverStoreError>;

    /// Writes a calibration label.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverStoreError`] on storage failure.
    fn write_label(&self, label: &ResolverLabel) -> Result<(), ResolverStoreError>;
}

// ============================================================================
// SECTION: LLM Decider (optional collaborator)
// ============================================================================

/// LLM decider errors.
#[derive(Debug, Error)]
pub enum LlmDeciderError {
    /// The LLM backend itself failed (timeout, malformed response).
    #[error("llm decider backend error: {0}")]
    Backend(String),
}

/// An LLM-assisted suggestion for a sponsor resolution that cleared no
/// candidate above `review_low`.
#[derive(Debug, Clone)]
pub struct LlmSuggestion {
    /// Suggested company, if the model proposed one.
    pub company_id: Option<CompanyId>,
    /// The prompt sent to the model, logged verbatim for audit.
    pub prompt: String,
    /// The raw model response, logged verbatim for audit.
    pub response: String,
}

/// Optional collaborator invoked when no candidate clears `review_low`.
pub trait LlmDecider {
    /// Produces a suggestion for `sponsor_text` given a structured trial
    /// snippet. Every attempt, success or failure, must be logged by the
    /// caller with its success flag, prompt, and response.
    ///
    /// # Errors
    ///
    /// Returns [`LlmDeciderError`] when the backend call itself fails; a
    /// backend call that succeeds but suggests no company is not an error.
    fn suggest(
        &self,
        sponsor_text: &str,
        trial_snippet: &serde_json::Value,
    ) -> Result<LlmSuggestion, LlmDeciderError>;
}

// ============================================================================
// SECTION: Change Detector Errors
// ============================================================================

/// Change detector errors.
#[derive(Debug, Error)]
pub enum ChangeDetectorError {
    /// The two versions being compared belong to different trials.
    #[error("cannot compare versions from different trials: {0} vs {1}")]
    MismatchedTrial(TrialId, TrialId),
}

// ============================================================================
// SECTION: Score Store
// ============================================================================

/// Score store errors.
#[derive(Debug, Error)]
pub enum ScoreStoreError {
    /// The underlying storage backend reported an error.
    #[error("score store backend error: {0}")]
    Backend(String),
    /// A score already exists for this `(trial_id, run_id)` pair.
    #[error("duplicate score for trial {trial_id} run {run_id}")]
    DuplicateScore {
        /// The trial already scored.
        trial_id: TrialId,
        /// The run that already wrote a score.
        run_id: RunId,
    },
}

/// Persists append-only gate/posterior scoring results.
pub trait ScoreStore {
    /// Writes a score result. Errors if `(trial_id, run_id)` already exists.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreStoreError`] on storage failure or duplicate write.
    fn write_score(&self, score: &ScoreResult) -> Result<(), ScoreStoreError>;

    /// Returns the most recent score recorded for `trial_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreStoreError`] on storage failure.
    fn latest_score(&self, trial_id: TrialId) -> Result<Option<ScoreResult>, ScoreStoreError>;
}

// ============================================================================
// SECTION: NctId re-export helper
// ============================================================================

/// Resolves a trial's NCT accession given its surrogate key; implemented by
/// whichever store owns the trial table. Kept minimal and separate from
/// [`VersionStore`] since not every caller needs it.
pub trait TrialLookup {
    /// Returns the NCT accession for `trial_id`, if the trial exists.
    ///
    /// # Errors
    ///
    /// Returns [`VersionStoreError`] on storage failure.
    fn nct_id_for(&self, trial_id: TrialId) -> Result<Option<NctId>, VersionStoreError>;
}
