// crates/trial-engine/src/study_card.rs
// ============================================================================
// Module: Study Card Fields
// Description: Typed view over a `StudyCard`'s opaque extracted fields.
// Purpose: Give the signal engine a structured, tolerant view instead of
//          raw `serde_json::Value` pointer traversal.
// Dependencies: serde, serde_json
// Grounded on: original_source/ncfd/src/ncfd/signals/primitives.py (dict shapes)
// ============================================================================

//! ## Overview
//! [`StudyCardFields`] mirrors the dictionary shape the original extraction
//! pipeline produced (`is_pivotal`, `primary_type`, `arms`, `analysis_plan`,
//! `primary_result`, `subgroups`, `pfs`/`os`). Every field defaults to
//! absent/false on missing or malformed input so a partially extracted card
//! still scores on what it does carry (`spec.md` §4.5, §4.6).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// SECTION: Top-Level Fields
// ============================================================================

/// Typed view over a [`trial_core::StudyCard`]'s opaque `fields` bag.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StudyCardFields {
    /// Caller-facing study identifier, echoed into signal evidence ids.
    pub study_id: Option<String>,
    /// Whether this study is registered as a pivotal trial.
    pub is_pivotal: bool,
    /// Whether the design is single-arm (no concurrent control).
    pub single_arm: bool,
    /// The primary analysis's statistical family.
    pub primary_type: Option<PrimaryType>,
    /// Treatment/control arm-level statistics.
    pub arms: Arms,
    /// The pre-specified statistical analysis plan.
    pub analysis_plan: AnalysisPlan,
    /// Historical control event/response rate, used when the plan omits one.
    pub historical_control_rate: Option<f64>,
    /// Minimal clinically important difference, used as a power-calc fallback.
    pub mcid_abs: Option<f64>,
    /// Observed event count, used when the plan's `planned_events` is absent.
    pub events_observed: Option<u32>,
    /// Total enrolled sample size.
    pub n_total: Option<u32>,
    /// Number of interim analyses actually conducted.
    pub actual_peeks: u32,
    /// ITT and per-protocol primary analysis results.
    pub primary_result: PrimaryResult,
    /// Subgroup analyses reported alongside the primary result.
    pub subgroups: Vec<Subgroup>,
    /// True when the press release or abstract foregrounds a subgroup win.
    pub narrative_highlights_subgroup: bool,
    /// True when the primary endpoint is subjective and unblinded.
    pub endpoint_subjective_unblinded: bool,
    /// Progression-free survival endpoint, when reported.
    pub pfs: Option<SurvivalEndpoint>,
    /// Overall survival endpoint, when reported.
    pub os: Option<SurvivalEndpoint>,
}

impl StudyCardFields {
    /// Builds a typed view from a study card's opaque `fields` value,
    /// defaulting to an empty view on any deserialization failure rather
    /// than propagating an error.
    #[must_use]
    pub fn from_value(fields: &Value) -> Self {
        serde_json::from_value(fields.clone()).unwrap_or_default()
    }
}

/// The statistical family of the primary analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryType {
    /// A two-proportion comparison (e.g. response rate).
    Proportion,
    /// A time-to-event (log-rank) comparison.
    Tte,
}

// ============================================================================
// SECTION: Arms
// ============================================================================

/// Treatment and control arm statistics.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Arms {
    /// Treatment arm.
    pub t: Option<ArmStats>,
    /// Control arm.
    pub c: Option<ArmStats>,
}

/// One arm's enrollment and dropout statistics.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ArmStats {
    /// Enrolled sample size for this arm.
    pub n: Option<u32>,
    /// Dropout fraction in `[0, 1]`.
    pub dropout: Option<f64>,
}

// ============================================================================
// SECTION: Analysis Plan
// ============================================================================

/// The pre-specified statistical analysis plan.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisPlan {
    /// Significance level for the primary analysis.
    pub alpha: Option<f64>,
    /// Whether the plan specifies a one-sided test (proportions default).
    pub one_sided: Option<bool>,
    /// Whether the plan specifies a two-sided test (time-to-event default).
    pub two_sided: Option<bool>,
    /// Assumed control-arm response rate used for the power calculation.
    pub assumed_p_c: Option<f64>,
    /// Assumed absolute treatment effect used for the power calculation.
    pub assumed_delta_abs: Option<f64>,
    /// Alternative-hypothesis hazard ratio for a time-to-event design.
    pub hr_alt: Option<f64>,
    /// Planned number of events at the time-to-event analysis.
    pub planned_events: Option<u32>,
    /// Allocation ratio (treatment : control).
    pub alloc_ratio: Option<f64>,
    /// Number of interim analyses planned at design time.
    pub planned_interims: u32,
    /// Alpha-spending function name, when one was pre-specified.
    pub alpha_spending: Option<String>,
    /// True when unplanned extra interim looks had alpha formally reallocated.
    pub reallocated_alpha: bool,
}

// ============================================================================
// SECTION: Primary Result
// ============================================================================

/// ITT and per-protocol primary analysis results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PrimaryResult {
    /// Intention-to-treat result.
    #[serde(rename = "ITT")]
    pub itt: ArmResult,
    /// Per-protocol result, when reported separately from ITT.
    #[serde(rename = "PP")]
    pub pp: Option<ArmResult>,
    /// Overall effect size, used by the implausible-effect signal.
    pub effect_size: Option<f64>,
}

/// One analysis population's primary-endpoint result.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ArmResult {
    /// Two-sided (or reported) p-value.
    pub p: Option<f64>,
    /// Point estimate of the treatment effect (sign convention: positive favors treatment).
    pub estimate: Option<f64>,
}

// ============================================================================
// SECTION: Subgroups
// ============================================================================

/// One reported subgroup analysis.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Subgroup {
    /// Subgroup display name.
    pub name: String,
    /// Subgroup-level p-value.
    pub p: Option<f64>,
    /// True when the p-value was adjusted for multiplicity.
    pub adjusted: bool,
    /// True when a treatment-by-subgroup interaction test was pre-specified.
    pub pre_specified_interaction: bool,
}

// ============================================================================
// SECTION: Survival Endpoints
// ============================================================================

/// A time-to-event endpoint's reported statistics.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SurvivalEndpoint {
    /// Two-sided p-value.
    pub p: Option<f64>,
    /// Hazard ratio (treatment vs control).
    pub hr: Option<f64>,
    /// Upper bound of the 95% confidence interval for the hazard ratio.
    pub ci95_upper: Option<f64>,
    /// Fraction of planned events observed at this analysis.
    pub events_frac: Option<f64>,
    /// Fraction of control-arm subjects who crossed over to treatment.
    pub crossover_rate: Option<f64>,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_default_tolerantly() {
        let fields = StudyCardFields::from_value(&json!({}));
        assert_eq!(fields, StudyCardFields::default());
    }

    #[test]
    fn parses_nested_shape() {
        let fields = StudyCardFields::from_value(&json!({
            "is_pivotal": true,
            "primary_type": "proportion",
            "arms": {"t": {"n": 200, "dropout": 0.1}, "c": {"n": 200, "dropout": 0.05}},
            "analysis_plan": {"alpha": 0.025, "one_sided": true, "assumed_p_c": 0.3, "assumed_delta_abs": 0.15},
            "primary_result": {"ITT": {"p": 0.2, "estimate": 0.05}}
        }));
        assert!(fields.is_pivotal);
        assert_eq!(fields.primary_type, Some(PrimaryType::Proportion));
        assert_eq!(fields.arms.t.as_ref().and_then(|arm| arm.n), Some(200));
        assert_eq!(fields.analysis_plan.assumed_delta_abs, Some(0.15));
        assert_eq!(fields.primary_result.itt.p, Some(0.2));
    }

    #[test]
    fn malformed_value_falls_back_to_default() {
        let fields = StudyCardFields::from_value(&json!({"arms": "not an object"}));
        assert_eq!(fields, StudyCardFields::default());
    }
}
