// crates/trial-core/src/core/trial.rs
// ============================================================================
// Module: Trial and TrialVersion
// Description: Registry-sourced trial entity and its append-only version log.
// Purpose: Provide the typed view the normalizer produces and the change
//          detector diffs.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A [`Trial`] is keyed by its NCT accession and carries only slowly-changing
//! identity fields. Everything that can legitimately change between registry
//! snapshots (phase, status, endpoint text, dates) lives on [`TrialVersion`],
//! which is append-only: a new row is recorded only when the content hash of
//! the raw registry record changes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use time::Date;
use time::OffsetDateTime;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::NctId;
use crate::core::identifiers::TrialId;

// ============================================================================
// SECTION: Trial
// ============================================================================

/// A clinical trial as known to the registry, identity fields only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Surrogate key.
    pub id: TrialId,
    /// ClinicalTrials.gov accession number, unique.
    pub nct_id: NctId,
    /// Free-text sponsor name as supplied by the registry, pre-resolution.
    pub sponsor_text: String,
    /// When this trial was first observed by the registry client.
    pub first_seen_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Trial Phase / Status / Intervention
// ============================================================================

/// Trial phase, tolerant of unrecognized registry values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialPhase {
    /// Early feasibility / phase 0.
    EarlyPhase1,
    /// Phase 1.
    Phase1,
    /// Phase 1/2 combined.
    Phase1Phase2,
    /// Phase 2.
    Phase2,
    /// Phase 2/3 combined.
    Phase2Phase3,
    /// Phase 3.
    Phase3,
    /// Phase 4.
    Phase4,
    /// Not applicable (e.g. device or observational studies).
    NotApplicable,
    /// A registry value this parser does not recognize.
    Unknown,
}

impl FromStr for TrialPhase {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Ok(match normalized.as_str() {
            "early_phase1" | "early_phase_1" => Self::EarlyPhase1,
            "phase1" | "phase_1" => Self::Phase1,
            "phase1_phase2" | "phase1/phase2" => Self::Phase1Phase2,
            "phase2" | "phase_2" => Self::Phase2,
            "phase2_phase3" | "phase2/phase3" => Self::Phase2Phase3,
            "phase3" | "phase_3" => Self::Phase3,
            "phase4" | "phase_4" => Self::Phase4,
            "na" | "not_applicable" => Self::NotApplicable,
            _ => Self::Unknown,
        })
    }
}

/// Trial recruitment/lifecycle status, tolerant of unrecognized values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    /// Not yet recruiting.
    NotYetRecruiting,
    /// Actively recruiting.
    Recruiting,
    /// Enrolling by invitation only.
    EnrollingByInvitation,
    /// Active, not recruiting.
    ActiveNotRecruiting,
    /// Suspended.
    Suspended,
    /// Terminated before completion.
    Terminated,
    /// Completed.
    Completed,
    /// Withdrawn before enrollment.
    Withdrawn,
    /// Unknown per the registry's own status vocabulary.
    UnknownStatus,
    /// A registry value this parser does not recognize.
    Unknown,
}

impl FromStr for TrialStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Ok(match normalized.as_str() {
            "not_yet_recruiting" => Self::NotYetRecruiting,
            "recruiting" => Self::Recruiting,
            "enrolling_by_invitation" => Self::EnrollingByInvitation,
            "active_not_recruiting" => Self::ActiveNotRecruiting,
            "suspended" => Self::Suspended,
            "terminated" => Self::Terminated,
            "completed" => Self::Completed,
            "withdrawn" => Self::Withdrawn,
            "unknown_status" | "unknown" => Self::UnknownStatus,
            _ => Self::Unknown,
        })
    }
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotYetRecruiting => "not_yet_recruiting",
            Self::Recruiting => "recruiting",
            Self::EnrollingByInvitation => "enrolling_by_invitation",
            Self::ActiveNotRecruiting => "active_not_recruiting",
            Self::Suspended => "suspended",
            Self::Terminated => "terminated",
            Self::Completed => "completed",
            Self::UnknownStatus => "unknown_status",
            Self::Withdrawn => "withdrawn",
            Self::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

/// Intervention model/type, tolerant of unrecognized values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    /// Drug intervention.
    Drug,
    /// Biological/vaccine intervention.
    Biological,
    /// Device intervention.
    Device,
    /// Procedure intervention.
    Procedure,
    /// Any other or unrecognized intervention type.
    Other,
}

// ============================================================================
// SECTION: TrialVersion
// ============================================================================

/// One append-only snapshot of a trial's registry record.
///
/// # Invariants
/// A new row is appended iff `content_hash` differs from the most recent
/// prior version for the same `trial_id`; the store, not this type, owns
/// that comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialVersion {
    /// The trial this version belongs to.
    pub trial_id: TrialId,
    /// When the registry client captured this snapshot.
    pub captured_at: OffsetDateTime,
    /// The raw registry record, verbatim, as an opaque JSON bag.
    pub raw: serde_json::Value,
    /// Content hash over the canonicalized `raw` bag.
    pub content_hash: HashDigest,
    /// Extracted scalar fields, never throwing on absence.
    pub scalars: TrialVersionScalars,
    /// Field-level changes versus the immediately preceding version, empty
    /// for the first version of a trial.
    pub changes: Vec<ChangeRecord>,
}

/// Scalar fields extracted from the raw record by the normalizer. Every
/// field is optional; extraction never throws (`spec.md` §4.2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialVersionScalars {
    /// Phase, if present and recognized.
    pub phase: Option<TrialPhase>,
    /// Recruitment status, if present.
    pub status: Option<TrialStatus>,
    /// Free-text primary endpoint description.
    pub primary_endpoint_text: Option<String>,
    /// Planned/actual sample size.
    pub sample_size: Option<u32>,
    /// Free-text statistical analysis plan.
    pub analysis_plan_text: Option<String>,
    /// Estimated primary completion date.
    pub estimated_primary_completion_date: Option<Date>,
    /// Randomization allocation (e.g. "Randomized", "Non-Randomized").
    pub allocation: Option<String>,
    /// Masking/blinding description.
    pub masking: Option<String>,
    /// Intervention model (e.g. "Parallel Assignment", "Single Group").
    pub intervention_model: Option<String>,
    /// Declared alpha level for the primary analysis, if disclosed.
    pub alpha_level: Option<f64>,
    /// Declared statistical power for the primary analysis, if disclosed.
    pub statistical_power: Option<f64>,
    /// Lead/primary intervention type, if a single dominant type exists.
    pub intervention_type: Option<InterventionType>,
}

// ============================================================================
// SECTION: Change Records
// ============================================================================

/// Significance bucket assigned by the change detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSignificance {
    /// Field named in the HIGH-significance list.
    High,
    /// Field named in the MEDIUM-significance list.
    Medium,
    /// Field named in the LOW-significance list.
    Low,
}

/// Whether a field-level change added, removed, or modified a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// The field had no value in the prior version and now has one.
    Added,
    /// The field had a value in the prior version and now has none.
    Removed,
    /// The field had a value in both versions and the value differs.
    Modified,
}

/// One field-level change between two consecutive trial versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Dotted field path within the scalar view (e.g. `primary_endpoint_text`).
    pub field: String,
    /// Previous value, rendered as a string for audit display.
    pub old_value: Option<String>,
    /// New value, rendered as a string for audit display.
    pub new_value: Option<String>,
    /// Whether the field was added, removed, or modified.
    pub change_type: ChangeType,
    /// Significance bucket for this field.
    pub significance: ChangeSignificance,
    /// True when the detector judged this a material numeric/text change,
    /// not merely a formatting difference.
    pub is_material: bool,
    /// True when this change occurred after the trial's estimated primary
    /// completion date had already passed at the time of the prior version.
    pub is_late: bool,
    /// Human-readable description of the change, for audit display.
    pub description: String,
}
