// crates/trial-core/src/core/score.rs
// ============================================================================
// Module: Gate & Posterior Audit Trail
// Description: Append-only scoring output and its audit trail.
// Purpose: Provide the typed result the gate/posterior engine emits, and
//          that the store persists verbatim.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A [`ScoreResult`] is the append-only output of one run of the gate and
//! posterior engine over one trial: the clamped prior, every gate's firing
//! state and contributed log likelihood-ratio, every stop-rule hit, and the
//! final failure probability. Every numeric field here is already clamped;
//! the engine never emits an un-clamped value.

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::RunId;
use crate::core::identifiers::SignalId;
use crate::core::identifiers::TrialId;

/// A pointer to the document/study-card text backing one piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSpan {
    /// Source document, trial version, or study card this span points into.
    pub source_id: String,
    /// Optional verbatim quoted text.
    pub quote: Option<String>,
    /// Optional page number, for paginated sources.
    pub page: Option<u32>,
    /// Optional start byte offset.
    pub start: Option<usize>,
    /// Optional end byte offset.
    pub end: Option<usize>,
}

/// One gate's evaluation outcome as captured in a [`ScoreResult`]'s audit
/// trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEvalRecord {
    /// Gate identifier (`G1`..`G4`).
    pub gate_id: String,
    /// Whether the gate fired.
    pub fired: bool,
    /// Signal ids that supported this gate's firing condition.
    pub supporting_signals: Vec<SignalId>,
    /// Likelihood ratio used for this gate (1.0 when not fired).
    pub lr_used: f64,
    /// Evidence spans backing the supporting signals.
    pub evidence_spans: Vec<EvidenceSpan>,
    /// Human-readable rationale string.
    pub rationale: String,
}

/// One stop-rule hit as captured in a [`ScoreResult`]'s audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRuleHitRecord {
    /// Stop-rule identifier.
    pub rule_id: String,
    /// Forced probability floor this rule applies.
    pub level: f64,
    /// Number of evidence items supporting this rule's trigger condition.
    pub evidence_count: usize,
}

/// The append-only output of one gate/posterior scoring run over one trial.
///
/// # Invariants
/// `prior`, `logit_prior`, `logit_post`, and `p_fail` are always the
/// post-clamp values; `sum_log_lr` is the sum of clamped per-gate
/// `ln(lr_used)` terms. A `(trial_id, run_id)` pair is written at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// The trial this score concerns.
    pub trial_id: TrialId,
    /// The run that produced this score.
    pub run_id: RunId,
    /// Clamped prior failure probability.
    pub prior: f64,
    /// `ln(prior / (1 - prior))`.
    pub logit_prior: f64,
    /// Sum of clamped per-gate log likelihood-ratios.
    pub sum_log_lr: f64,
    /// Clamped posterior logit.
    pub logit_post: f64,
    /// Final failure probability after stop-rule overrides.
    pub p_fail: f64,
    /// Every gate considered, fired or not.
    pub gate_evals: Vec<GateEvalRecord>,
    /// Every stop rule that hit.
    pub stop_rules_applied: Vec<StopRuleHitRecord>,
    /// Evidence spans for every signal that contributed to the score.
    pub evidence_spans: Vec<EvidenceSpan>,
    /// When this score was computed.
    pub created_at: OffsetDateTime,
}
