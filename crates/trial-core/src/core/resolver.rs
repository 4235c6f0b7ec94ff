// crates/trial-core/src/core/resolver.rs
// ============================================================================
// Module: Sponsor Resolver Records
// Description: Append-only resolver decisions, the human review queue, and
//              calibration labels.
// Purpose: Provide the typed audit trail for sponsor_text -> company_id
//          resolution.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The resolver writes a [`ResolverDecisionRecord`] for every `accept`, and a
//! [`ResolverReviewItem`] (with the full frozen candidate list) for every
//! `review`. `reject` is deliberately not persisted as a decision (`spec.md`
//! §4.4) though the caller may still retain features for calibration
//! elsewhere. [`ResolverLabel`] rows are written by reviewers and drive
//! future recalibration of the logistic scorer's weights.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::CompanyId;
use crate::core::identifiers::NctId;
use crate::core::identifiers::ReviewItemId;
use crate::core::identifiers::RunId;

/// How a [`ResolverDecisionRecord`] was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverDecisionMode {
    /// Accepted automatically or by a human/LLM reviewer.
    Accept,
    /// Queued for human review; no company assigned yet.
    Review,
    /// Rejected; by design never persisted as a decision row.
    Reject,
}

/// One resolver decision for a `(run_id, nct_id)` pair.
///
/// # Invariants
/// `mode == Accept` implies `company_id.is_some()`; `mode == Review` implies
/// `company_id.is_none()`. The store must reject a row violating either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverDecisionRecord {
    /// The run this decision belongs to.
    pub run_id: RunId,
    /// The trial's NCT accession.
    pub nct_id: NctId,
    /// The free-text sponsor name that was resolved.
    pub sponsor_text: String,
    /// The decision mode.
    pub mode: ResolverDecisionMode,
    /// The accepted company, required iff `mode == Accept`.
    pub company_id: Option<CompanyId>,
    /// Leader candidate's calibrated probability.
    pub probability: f64,
    /// `p_top - p_second` at decision time.
    pub top2_margin: f64,
    /// Per-candidate feature vectors considered, keyed by feature name.
    pub features: BTreeMap<String, f64>,
    /// Snapshot of the leading candidate's metadata (name, aliases matched).
    pub leader_meta: serde_json::Value,
    /// Who/what decided: `"auto"`, `"human"`, or `"llm"`.
    pub decided_by: String,
    /// Free-text notes, e.g. a human reviewer's rationale.
    pub notes: Option<String>,
    /// When this decision was recorded.
    pub created_at: OffsetDateTime,
}

/// One ranked candidate as frozen into a [`ResolverReviewItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewCandidate {
    /// Candidate company.
    pub company_id: CompanyId,
    /// Calibrated probability for this candidate.
    pub probability: f64,
    /// Feature vector used to score this candidate.
    pub features: BTreeMap<String, f64>,
}

/// A queued human-review item for a sponsor resolution that did not clear
/// the accept threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverReviewItem {
    /// Surrogate key.
    pub id: ReviewItemId,
    /// The run this review item belongs to.
    pub run_id: RunId,
    /// The trial's NCT accession.
    pub nct_id: NctId,
    /// The free-text sponsor name that was resolved.
    pub sponsor_text: String,
    /// Full ranked candidate list, frozen at creation time.
    pub candidates: Vec<ReviewCandidate>,
    /// When this review item was created.
    pub created_at: OffsetDateTime,
    /// True once a human or LLM reviewer has resolved this item.
    pub resolved: bool,
}

/// A calibration label asserting whether `(nct_id, sponsor_text)` matches
/// `company_id`. Feeds future recalibration of the logistic scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverLabel {
    /// The trial's NCT accession.
    pub nct_id: NctId,
    /// Normalized sponsor text the label applies to.
    pub sponsor_text_norm: String,
    /// The company the label concerns.
    pub company_id: CompanyId,
    /// True if this is a positive match label, false if negative.
    pub is_match: bool,
    /// Label provenance, e.g. `"human_review"`, `"llm_suggestion"`.
    pub source: String,
}
