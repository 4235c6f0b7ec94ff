// crates/trial-engine/src/gates.rs
// ============================================================================
// Module: Gate & Posterior Engine
// Description: G1..G4 boolean gate composition, stop-rule overrides, and the
//              clamped logit-space posterior computation.
// Purpose: Turn a present-signal set into a `ScoreResult`'s numeric body.
// Dependencies: ret-logic, trial-config, trial-core
// Grounded on: spec.md §4.7; crates/decision-gate-core/src/runtime (tri-state
//              requirement evaluation over a universal condition algebra)
// ============================================================================

//! ## Overview
//! Each gate's firing condition is a [`Requirement<SignalId>`] evaluated over
//! the set of fired signal ids (`Requirement::eval_presence`), generalizing
//! the teacher's tri-state requirement tree to a simple presence test: a gate
//! fires when its `S`-signal boolean composition is satisfied by the signals
//! that actually fired. This collapses what the original scorer expressed as
//! one function per gate into a single data-driven [`evaluate_gates`] call.
//!
//! Stop rules are evaluated against a caller-supplied set of opaque extra
//! flags (e.g. `endpoint_switched_after_LPR`), since their trigger conditions
//! reference structured facts (late endpoint switch, ITT/PP coverage gaps,
//! blinding feasibility) that live outside the `S1`..`S9` signal algebra.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use ret_logic::Requirement;
use trial_config::GateConfig;
use trial_config::GateDef;
use trial_config::GateGlobalConfig;
use trial_config::PriorAdjustmentRule;
use trial_config::StopRuleDef;
use trial_core::EvidenceSpan;
use trial_core::GateEvalRecord;
use trial_core::SignalId;
use trial_core::StopRuleHitRecord;

use crate::signals::SignalResult;

// ============================================================================
// SECTION: Trial Prior Context
// ============================================================================

/// The trial-metadata predicates the prior-adjustment table matches against
/// (`spec.md` §4.7: `pivotal`, `oncology`, `rare_disease`, `phase3`, `phase1`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorContext {
    /// The trial is a pivotal/registrational study.
    pub pivotal: bool,
    /// The trial's indication is oncology.
    pub oncology: bool,
    /// The trial's indication is a rare disease.
    pub rare_disease: bool,
    /// The trial is Phase 3.
    pub phase3: bool,
    /// The trial is Phase 1.
    pub phase1: bool,
}

impl PriorContext {
    fn matches(self, predicate: &str) -> bool {
        match predicate {
            "pivotal" => self.pivotal,
            "oncology" => self.oncology,
            "rare_disease" => self.rare_disease,
            "phase3" => self.phase3,
            "phase1" => self.phase1,
            _ => false,
        }
    }
}

// ============================================================================
// SECTION: Gate Definitions (hardcoded boolean structure)
// ============================================================================

struct GateDefinition {
    gate_id: &'static str,
    requirement: Requirement<SignalId>,
}

fn condition(id: &str) -> Requirement<SignalId> {
    Requirement::condition(SignalId::new(id))
}

/// The fixed `G1`..`G4` boolean compositions over `S1`..`S9` (`spec.md`
/// §4.7). Gate identity and structure are code, not configuration; only the
/// likelihood ratios attached to each gate are configurable.
fn gate_definitions() -> Vec<GateDefinition> {
    vec![
        GateDefinition {
            gate_id: "G1",
            requirement: Requirement::and(vec![condition("S1"), condition("S2")]),
        },
        GateDefinition {
            gate_id: "G2",
            requirement: Requirement::and(vec![condition("S3"), condition("S4")]),
        },
        GateDefinition {
            gate_id: "G3",
            requirement: Requirement::and(vec![
                condition("S5"),
                Requirement::or(vec![condition("S7"), condition("S6")]),
            ]),
        },
        GateDefinition {
            gate_id: "G4",
            requirement: Requirement::and(vec![
                condition("S8"),
                Requirement::or(vec![condition("S1"), condition("S3")]),
            ]),
        },
    ]
}

// ============================================================================
// SECTION: Engine Configuration
// ============================================================================

/// Errors constructing a [`GateEngineConfig`] from a deserialized
/// [`GateConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateEngineError {
    /// The configuration is missing likelihood-ratio settings for a gate the
    /// engine's hardcoded boolean structure requires.
    #[error("gate configuration is missing a definition for {0}")]
    MissingGateDefinition(&'static str),
}

/// Resolved gate-engine configuration: the hardcoded `G1`..`G4` firing
/// conditions, bound to their configured likelihood ratios, stop rules, and
/// prior-adjustment table.
#[derive(Debug, Clone)]
pub struct GateEngineConfig {
    global: GateGlobalConfig,
    gates: BTreeMap<String, GateDef>,
    stop_rules: BTreeMap<String, StopRuleDef>,
    prior_adjustments: Vec<PriorAdjustmentRule>,
    base_prior: f64,
}

impl GateEngineConfig {
    /// Builds an engine configuration from a deserialized [`GateConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`GateEngineError::MissingGateDefinition`] when the config
    /// carries no likelihood-ratio entry for one of `G1`..`G4`.
    pub fn from_config(config: &GateConfig) -> Result<Self, GateEngineError> {
        for gate_id in ["G1", "G2", "G3", "G4"] {
            if !config.gates.contains_key(gate_id) {
                return Err(GateEngineError::MissingGateDefinition(gate_id));
            }
        }
        Ok(Self {
            global: config.global,
            gates: config.gates.clone(),
            stop_rules: config.stop_rules.clone(),
            prior_adjustments: config.prior_adjustments.clone(),
            base_prior: config.base_prior,
        })
    }
}

// ============================================================================
// SECTION: Posterior Result
// ============================================================================

/// The numeric body of one gate/posterior scoring run. The caller (broker)
/// attaches `trial_id`, `run_id`, and `created_at` to build a `ScoreResult`.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorResult {
    /// Clamped prior failure probability.
    pub prior: f64,
    /// `ln(prior / (1 - prior))`.
    pub logit_prior: f64,
    /// Sum of clamped per-gate log likelihood-ratios.
    pub sum_log_lr: f64,
    /// Clamped posterior logit, before any stop-rule override.
    pub logit_post: f64,
    /// Final failure probability after stop-rule overrides.
    pub p_fail: f64,
    /// Every gate considered, fired or not.
    pub gate_evals: Vec<GateEvalRecord>,
    /// Every stop rule that hit.
    pub stop_rules_applied: Vec<StopRuleHitRecord>,
    /// Evidence spans for every signal that contributed to the score.
    pub evidence_spans: Vec<EvidenceSpan>,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates `G1`..`G4` over `signals`, applies stop-rule overrides from
/// `stop_rule_flags`, and computes the clamped logit-space posterior
/// (`spec.md` §4.7).
///
/// `stop_rule_flags` carries caller-determined opaque facts (e.g.
/// `endpoint_switched_after_LPR`) the engine cannot derive from `S1`..`S9`
/// alone; a flag fires its matching configured stop rule when present.
#[must_use]
pub fn evaluate_gates(
    signals: &[SignalResult],
    stop_rule_flags: &BTreeSet<String>,
    prior_context: PriorContext,
    config: &GateEngineConfig,
) -> PosteriorResult {
    let present: BTreeSet<SignalId> = signals
        .iter()
        .filter(|s| s.fired)
        .map(|s| s.signal_id.clone())
        .collect();

    let prior = clamp(
        construct_prior(config.base_prior, &config.prior_adjustments, prior_context),
        config.global.prior_floor,
        config.global.prior_ceil,
    );
    let logit_prior = clamp(logit(prior), config.global.logit_min, config.global.logit_max);

    let mut sum_log_lr = 0.0;
    let mut gate_evals = Vec::new();
    let mut evidence_spans = Vec::new();

    for definition in gate_definitions() {
        let fired = definition.requirement.eval_presence(&|id| present.contains(id));
        if !fired {
            gate_evals.push(GateEvalRecord {
                gate_id: definition.gate_id.to_string(),
                fired: false,
                supporting_signals: Vec::new(),
                lr_used: 1.0,
                evidence_spans: Vec::new(),
                rationale: format!("{} firing condition not satisfied", definition.gate_id),
            });
            continue;
        }

        let supporting: Vec<SignalId> = definition
            .requirement
            .leaves()
            .into_iter()
            .filter(|id| present.contains(id))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let gate_def = config.gates.get(definition.gate_id);
        let lr_used = gate_def.map_or(1.0, |def| select_likelihood_ratio(def, &supporting, signals));
        let log_lr = clamp(
            lr_used.ln(),
            config.global.lr_min.ln(),
            config.global.lr_max.ln(),
        );
        sum_log_lr += log_lr;

        let spans: Vec<EvidenceSpan> = signals
            .iter()
            .filter(|s| supporting.contains(&s.signal_id))
            .flat_map(|s| s.evidence_spans.iter().cloned())
            .collect();
        evidence_spans.extend(spans.iter().cloned());

        gate_evals.push(GateEvalRecord {
            gate_id: definition.gate_id.to_string(),
            fired: true,
            supporting_signals: supporting,
            lr_used,
            evidence_spans: spans,
            rationale: format!("{} fired on configured likelihood ratio {lr_used:.3}", definition.gate_id),
        });
    }

    let logit_post = clamp(
        logit_prior + sum_log_lr,
        config.global.logit_min,
        config.global.logit_max,
    );
    let computed_p_fail = sigmoid(logit_post);

    let mut stop_rules_applied = Vec::new();
    let mut p_fail = computed_p_fail;
    for (rule_id, rule_def) in &config.stop_rules {
        if !stop_rule_flags.contains(rule_id) {
            continue;
        }
        stop_rules_applied.push(StopRuleHitRecord {
            rule_id: rule_id.clone(),
            level: rule_def.level,
            evidence_count: 1,
        });
        p_fail = p_fail.max(rule_def.level);
    }

    PosteriorResult {
        prior,
        logit_prior,
        sum_log_lr,
        logit_post,
        p_fail,
        gate_evals,
        stop_rules_applied,
        evidence_spans,
    }
}

/// Picks the likelihood ratio for a fired gate: the highest severity-indexed
/// override among its supporting signals, falling back to the gate's
/// baseline `lr` when no override matches or no severity key is configured.
fn select_likelihood_ratio(def: &GateDef, supporting: &[SignalId], signals: &[SignalResult]) -> f64 {
    let max_severity = supporting
        .iter()
        .filter_map(|id| signals.iter().find(|s| &s.signal_id == id))
        .map(|s| s.severity)
        .max();
    let Some(severity) = max_severity else {
        return def.lr;
    };
    let key = match severity {
        crate::signals::Severity::High => "H",
        crate::signals::Severity::Medium => "M",
        crate::signals::Severity::Low => "L",
    };
    def.by_severity.get(key).copied().unwrap_or(def.lr)
}

fn construct_prior(base_prior: f64, rules: &[PriorAdjustmentRule], context: PriorContext) -> f64 {
    rules.iter().fold(base_prior, |acc, rule| {
        if context.matches(&rule.predicate) {
            acc * rule.factor
        } else {
            acc
        }
    })
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Severity;

    fn config() -> GateEngineConfig {
        GateEngineConfig::from_config(&GateConfig::default()).unwrap()
    }

    fn fired(id: &str, severity: Severity) -> SignalResult {
        SignalResult {
            signal_id: SignalId::new(id),
            fired: true,
            severity,
            value: None,
            reason: "test".to_string(),
            evidence_spans: vec![EvidenceSpan {
                source_id: id.to_string(),
                quote: None,
                page: None,
                start: None,
                end: None,
            }],
            low_cert_inputs: false,
        }
    }

    #[test]
    fn no_signals_fire_no_gates() {
        let result = evaluate_gates(&[], &BTreeSet::new(), PriorContext::default(), &config());
        assert!(result.gate_evals.iter().all(|g| !g.fired));
        assert_eq!(result.sum_log_lr, 0.0);
    }

    #[test]
    fn g1_fires_on_s1_and_s2() {
        let signals = vec![fired("S1", Severity::High), fired("S2", Severity::High)];
        let result = evaluate_gates(&signals, &BTreeSet::new(), PriorContext::default(), &config());
        let g1 = result.gate_evals.iter().find(|g| g.gate_id == "G1").unwrap();
        assert!(g1.fired);
        assert_eq!(g1.lr_used, 6.0);
        assert_eq!(g1.supporting_signals.len(), 2);
    }

    #[test]
    fn g1_does_not_fire_on_s1_alone() {
        let signals = vec![fired("S1", Severity::High)];
        let result = evaluate_gates(&signals, &BTreeSet::new(), PriorContext::default(), &config());
        let g1 = result.gate_evals.iter().find(|g| g.gate_id == "G1").unwrap();
        assert!(!g1.fired);
    }

    #[test]
    fn g3_fires_via_either_or_branch() {
        let signals = vec![fired("S5", Severity::Medium), fired("S6", Severity::Medium)];
        let result = evaluate_gates(&signals, &BTreeSet::new(), PriorContext::default(), &config());
        let g3 = result.gate_evals.iter().find(|g| g.gate_id == "G3").unwrap();
        assert!(g3.fired);
    }

    #[test]
    fn stop_rule_flag_overrides_posterior() {
        let mut flags = BTreeSet::new();
        flags.insert("endpoint_switched_after_LPR".to_string());
        let result = evaluate_gates(&[], &flags, PriorContext::default(), &config());
        assert_eq!(result.stop_rules_applied.len(), 1);
        assert!(result.p_fail >= 0.90);
    }

    #[test]
    fn prior_adjustments_multiply_base_prior() {
        let context = PriorContext {
            pivotal: true,
            oncology: false,
            rare_disease: false,
            phase3: false,
            phase1: false,
        };
        let result = evaluate_gates(&[], &BTreeSet::new(), context, &config());
        let expected = clamp(
            GateConfig::default().base_prior * 1.2,
            GateGlobalConfig::default().prior_floor,
            GateGlobalConfig::default().prior_ceil,
        );
        assert!((result.prior - expected).abs() < 1e-9);
    }

    #[test]
    fn clamp_keeps_values_within_bounds() {
        assert_eq!(clamp(5.0, 0.0, 1.0), 1.0);
        assert_eq!(clamp(-5.0, 0.0, 1.0), 0.0);
        assert_eq!(clamp(0.5, 0.0, 1.0), 0.5);
    }
}
