// crates/trial-engine/src/signals.rs
// ============================================================================
// Module: Signal Engine
// Description: S1..S9 risk-pattern detectors over a study card and its
//              trial's change history.
// Purpose: Produce the typed signal results the gate engine consumes.
// Dependencies: trial-core
// Grounded on: original_source/ncfd/src/ncfd/signals/primitives.py
// ============================================================================

//! ## Overview
//! Each `sN` function inspects one [`StudyCardFields`] (plus, for `s1`, the
//! trial's change history) and returns a [`SignalResult`] describing whether
//! the pattern fired, at what severity, and with what evidence (`spec.md`
//! §4.6). The statistical helpers (`phi`, `phi_inv`, `power_two_proportions`,
//! `power_logrank`) reproduce the Abramowitz-Stegun normal approximations the
//! original detector used; they are private implementation detail, not
//! configuration surface.

// ============================================================================
// SECTION: Imports
// ============================================================================

use trial_core::ChangeRecord;
use trial_core::ChangeSignificance;
use trial_core::EvidenceSpan;
use trial_core::SignalId;

use crate::study_card::StudyCardFields;

// ============================================================================
// SECTION: Result Types
// ============================================================================

/// Severity bucket a fired signal is reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Worth noting, low individual weight.
    Low,
    /// Materially affects risk, moderate individual weight.
    Medium,
    /// Strong individual risk indicator.
    High,
}

/// The outcome of evaluating one signal against a study card.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalResult {
    /// The signal identifier (`S1`..`S9`).
    pub signal_id: SignalId,
    /// Whether the pattern fired.
    pub fired: bool,
    /// Severity, meaningful only when `fired` is true.
    pub severity: Severity,
    /// The numeric value the firing decision was based on, when applicable.
    pub value: Option<f64>,
    /// Human-readable rationale string.
    pub reason: String,
    /// Evidence spans backing this result.
    pub evidence_spans: Vec<EvidenceSpan>,
    /// True when the result relied on a low-certainty fallback input
    /// (e.g. an assumed power-calculation input the card did not report).
    pub low_cert_inputs: bool,
}

impl SignalResult {
    fn not_fired(signal_id: &str) -> Self {
        Self {
            signal_id: SignalId::new(signal_id),
            fired: false,
            severity: Severity::Low,
            value: None,
            reason: "insufficient data".to_string(),
            evidence_spans: Vec::new(),
            low_cert_inputs: false,
        }
    }
}

fn evidence(source_id: &str, quote: impl Into<String>) -> EvidenceSpan {
    EvidenceSpan {
        source_id: source_id.to_string(),
        quote: Some(quote.into()),
        page: None,
        start: None,
        end: None,
    }
}

// ============================================================================
// SECTION: Statistical Helpers
// ============================================================================

/// Standard normal CDF, Abramowitz & Stegun formula 26.2.17.
fn phi(z: f64) -> f64 {
    let b0 = 0.2316419;
    let b1 = 0.319_381_530;
    let b2 = -0.356_563_782;
    let b3 = 1.781_477_937;
    let b4 = -1.821_255_978;
    let b5 = 1.330_274_429;
    let sign = if z < 0.0 { -1.0 } else { 1.0 };
    let z = z.abs();
    let t = 1.0 / (1.0 + b0 * z);
    let poly = t * (b1 + t * (b2 + t * (b3 + t * (b4 + t * b5))));
    let density = (-z * z / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt();
    let upper_tail = density * poly;
    0.5 + sign * (0.5 - upper_tail)
}

/// Inverse standard normal CDF via bisection against [`phi`], accurate to
/// better than 1e-6 over the probability range signal thresholds use.
fn phi_inv(p: f64) -> f64 {
    let p = p.clamp(1e-9, 1.0 - 1e-9);
    let (mut lo, mut hi) = (-10.0_f64, 10.0_f64);
    for _ in 0..100 {
        let mid = (lo + hi) / 2.0;
        if phi(mid) < p {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (lo + hi) / 2.0
}

/// Two-sided critical z value for a given alpha, one- or two-sided.
fn z_for(alpha: f64, one_sided: bool) -> f64 {
    if one_sided {
        phi_inv(1.0 - alpha)
    } else {
        phi_inv(1.0 - alpha / 2.0)
    }
}

/// Post-hoc power for a two-proportion z-test with per-arm sample size `n`,
/// assumed control rate `p_c`, and assumed absolute effect `delta`.
fn power_two_proportions(n: f64, p_c: f64, delta: f64, alpha: f64, one_sided: bool) -> f64 {
    if n <= 0.0 {
        return 0.0;
    }
    let p_t = (p_c + delta).clamp(0.0, 1.0);
    let p_bar = (p_c + p_t) / 2.0;
    let z_alpha = z_for(alpha, one_sided);
    let se_null = (2.0 * p_bar * (1.0 - p_bar) / n).sqrt();
    let se_alt = (p_c * (1.0 - p_c) / n + p_t * (1.0 - p_t) / n).sqrt();
    if se_alt <= 0.0 {
        return 0.0;
    }
    let z_score = ((p_t - p_c).abs() - z_alpha * se_null) / se_alt;
    phi(z_score)
}

/// Post-hoc power for a log-rank test via Freedman's formula, using the
/// observed allocation ratio `k = n_t / n_c`.
fn power_logrank(events: f64, hr: f64, alloc_ratio: f64, alpha: f64, one_sided: bool) -> f64 {
    if events <= 0.0 || hr <= 0.0 || hr == 1.0 {
        return 0.0;
    }
    let k = alloc_ratio.max(1e-6);
    let psi = k / (1.0 + k).powi(2);
    let z_alpha = z_for(alpha, one_sided);
    let delta = hr.ln().abs() * (events * psi).sqrt();
    phi(delta - z_alpha)
}

fn normalize_endpoint_text(text: &str) -> String {
    text.to_ascii_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// SECTION: S1 — Material Endpoint/Design Change
// ============================================================================

/// Fires when the trial's change history carries a high-significance change
/// to the primary endpoint text, analysis plan text, phase, allocation, or
/// masking, and that change was recorded after the prior completion date had
/// already passed (a late, material protocol change).
#[must_use]
pub fn s1_material_change(trial_id: &str, changes: &[ChangeRecord]) -> SignalResult {
    let fields = [
        "primary_endpoint_text",
        "analysis_plan_text",
        "phase",
        "allocation",
        "masking",
    ];
    let hit = changes.iter().find(|change| {
        change.is_late
            && change.is_material
            && change.significance == ChangeSignificance::High
            && fields.contains(&change.field.as_str())
    });
    match hit {
        Some(change) => SignalResult {
            signal_id: SignalId::new("S1"),
            fired: true,
            severity: Severity::High,
            value: None,
            reason: format!(
                "late material change to {} after completion date had passed",
                change.field
            ),
            evidence_spans: vec![evidence(trial_id, change.description.clone())],
            low_cert_inputs: false,
        },
        None => SignalResult::not_fired("S1"),
    }
}

// ============================================================================
// SECTION: S2 — Underpowered Primary Analysis
// ============================================================================

/// Fires when the pre-specified (or inferred) primary analysis is
/// underpowered for its own assumed effect size. Falls back to conservative
/// defaults (`mcid_abs = 0.12`, `events ≈ 0.6 * N_total`) when the card omits
/// the power-calculation inputs, flagging `low_cert_inputs` in that case.
#[must_use]
pub fn s2_underpowered(study_id: &str, card: &StudyCardFields) -> SignalResult {
    let plan = &card.analysis_plan;
    let alpha = plan.alpha.unwrap_or(0.05);
    let one_sided = plan.one_sided.unwrap_or(!plan.two_sided.unwrap_or(false));

    let (power, low_cert) = match card.primary_type {
        Some(crate::study_card::PrimaryType::Proportion) => {
            let n_t = card.arms.t.as_ref().and_then(|arm| arm.n);
            let n_c = card.arms.c.as_ref().and_then(|arm| arm.n);
            let (n, low_cert_n) = match (n_t, n_c) {
                (Some(t), Some(c)) => ((t.min(c)) as f64, false),
                _ => (card.n_total.map_or(100.0, |n| f64::from(n) / 2.0), true),
            };
            let p_c = plan.assumed_p_c.unwrap_or(card.historical_control_rate.unwrap_or(0.3));
            let delta = plan.assumed_delta_abs.unwrap_or(card.mcid_abs.unwrap_or(0.12));
            let low_cert = low_cert_n || plan.assumed_p_c.is_none() || plan.assumed_delta_abs.is_none();
            (power_two_proportions(n, p_c, delta, alpha, one_sided), low_cert)
        }
        Some(crate::study_card::PrimaryType::Tte) => {
            let events = plan
                .planned_events
                .or(card.events_observed)
                .map(f64::from)
                .unwrap_or_else(|| card.n_total.map_or(120.0, |n| f64::from(n) * 0.6));
            let hr = plan.hr_alt.unwrap_or(0.7);
            let alloc_ratio = plan.alloc_ratio.unwrap_or(1.0);
            let low_cert = plan.planned_events.is_none() || plan.hr_alt.is_none();
            (power_logrank(events, hr, alloc_ratio, alpha, one_sided), low_cert)
        }
        None => return SignalResult::not_fired("S2"),
    };

    let severity = if power < 0.55 {
        Some(Severity::High)
    } else if power < 0.70 {
        Some(Severity::Medium)
    } else {
        None
    };

    match severity {
        Some(severity) => SignalResult {
            signal_id: SignalId::new("S2"),
            fired: true,
            severity,
            value: Some(power),
            reason: format!("estimated power {power:.2} for the primary analysis"),
            evidence_spans: vec![evidence(study_id, format!("power={power:.2}"))],
            low_cert_inputs: low_cert,
        },
        None => SignalResult::not_fired("S2"),
    }
}

// ============================================================================
// SECTION: S3 — Subgroup Multiplicity
// ============================================================================

/// Fires when a narrative-highlighted subgroup result is both unadjusted for
/// multiplicity and lacked a pre-specified interaction test.
#[must_use]
pub fn s3_subgroup_multiplicity(study_id: &str, card: &StudyCardFields) -> SignalResult {
    let offender = card.subgroups.iter().find(|subgroup| {
        subgroup.p.is_some_and(|p| p < 0.05) && !subgroup.adjusted && !subgroup.pre_specified_interaction
    });
    match offender {
        Some(subgroup) if card.narrative_highlights_subgroup => SignalResult {
            signal_id: SignalId::new("S3"),
            fired: true,
            severity: Severity::Medium,
            value: subgroup.p,
            reason: format!(
                "subgroup \"{}\" highlighted without multiplicity adjustment or pre-specified interaction test",
                subgroup.name
            ),
            evidence_spans: vec![evidence(study_id, subgroup.name.clone())],
            low_cert_inputs: false,
        },
        _ => SignalResult::not_fired("S3"),
    }
}

// ============================================================================
// SECTION: S4 — ITT/PP Contradiction
// ============================================================================

/// Fires when the intention-to-treat and per-protocol primary results
/// disagree on statistical significance and the arms show asymmetric
/// dropout, suggesting differential attrition drove the discrepancy.
#[must_use]
pub fn s4_itt_pp_contradiction(study_id: &str, card: &StudyCardFields) -> SignalResult {
    let Some(pp) = &card.primary_result.pp else {
        return SignalResult::not_fired("S4");
    };
    let (Some(itt_p), Some(pp_p)) = (card.primary_result.itt.p, pp.p) else {
        return SignalResult::not_fired("S4");
    };
    let itt_significant = itt_p < 0.05;
    let pp_significant = pp_p < 0.05;
    if itt_significant == pp_significant {
        return SignalResult::not_fired("S4");
    }
    let dropout_t = card.arms.t.as_ref().and_then(|arm| arm.dropout).unwrap_or(0.0);
    let dropout_c = card.arms.c.as_ref().and_then(|arm| arm.dropout).unwrap_or(0.0);
    let asymmetry = (dropout_t - dropout_c).abs();
    let severity = if asymmetry >= 0.15 {
        Some(Severity::High)
    } else if asymmetry >= 0.10 {
        Some(Severity::Medium)
    } else {
        None
    };
    match severity {
        Some(severity) => SignalResult {
            signal_id: SignalId::new("S4"),
            fired: true,
            severity,
            value: Some(asymmetry),
            reason: format!(
                "ITT (p={itt_p:.3}) and PP (p={pp_p:.3}) disagree on significance with {asymmetry:.2} dropout asymmetry"
            ),
            evidence_spans: vec![evidence(study_id, "ITT/PP discordance")],
            low_cert_inputs: false,
        },
        None => SignalResult::not_fired("S4"),
    }
}

// ============================================================================
// SECTION: S5 — Implausible Effect Size
// ============================================================================

/// Fires when the reported effect size sits above the historical class's
/// 90th percentile (high severity) or 75th percentile (medium severity) of
/// effects for similar designs, a "graveyard" implausibility check.
#[must_use]
pub fn s5_implausible_effect(
    study_id: &str,
    card: &StudyCardFields,
    class_p75: f64,
    class_p90: f64,
) -> SignalResult {
    let Some(effect_size) = card.primary_result.effect_size else {
        return SignalResult::not_fired("S5");
    };
    let severity = if effect_size.abs() >= class_p90 {
        Some(Severity::High)
    } else if effect_size.abs() >= class_p75 {
        Some(Severity::Medium)
    } else {
        None
    };
    match severity {
        Some(severity) => SignalResult {
            signal_id: SignalId::new("S5"),
            fired: true,
            severity,
            value: Some(effect_size),
            reason: format!(
                "reported effect size {effect_size:.2} exceeds class percentile ({class_p75:.2}/{class_p90:.2})"
            ),
            evidence_spans: vec![evidence(study_id, format!("effect_size={effect_size:.2}"))],
            low_cert_inputs: false,
        },
        None => SignalResult::not_fired("S5"),
    }
}

// ============================================================================
// SECTION: S6 — Interim-Look Alpha Spending
// ============================================================================

/// Fires when the trial conducted more interim looks than planned without a
/// documented alpha-spending adjustment.
#[must_use]
pub fn s6_interim_alpha_spending(study_id: &str, card: &StudyCardFields) -> SignalResult {
    let plan = &card.analysis_plan;
    if card.actual_peeks <= plan.planned_interims {
        return SignalResult::not_fired("S6");
    }
    let documented = plan.alpha_spending.is_some() || plan.reallocated_alpha;
    if documented {
        return SignalResult::not_fired("S6");
    }
    let extra = card.actual_peeks - plan.planned_interims;
    let severity = if extra >= 2 { Severity::High } else { Severity::Medium };
    SignalResult {
        signal_id: SignalId::new("S6"),
        fired: true,
        severity,
        value: Some(f64::from(extra)),
        reason: format!(
            "{} unplanned interim look(s) with no documented alpha-spending adjustment",
            extra
        ),
        evidence_spans: vec![evidence(study_id, "interim look count exceeds plan")],
        low_cert_inputs: false,
    }
}

// ============================================================================
// SECTION: S7 — Single-Arm vs RCT Standard
// ============================================================================

/// Fires when a pivotal study is single-arm in a therapeutic area whose
/// standard of evidence is a randomized controlled trial.
#[must_use]
pub fn s7_single_arm_vs_rct_standard(study_id: &str, card: &StudyCardFields, rct_is_standard: bool) -> SignalResult {
    if !(card.single_arm && card.is_pivotal && rct_is_standard) {
        return SignalResult::not_fired("S7");
    }
    SignalResult {
        signal_id: SignalId::new("S7"),
        fired: true,
        severity: Severity::Medium,
        value: None,
        reason: "pivotal single-arm design where a randomized controlled trial is the evidentiary standard".to_string(),
        evidence_spans: vec![evidence(study_id, "single_arm=true, is_pivotal=true")],
        low_cert_inputs: false,
    }
}

// ============================================================================
// SECTION: S8 — P-Value Cusp/Heaping
// ============================================================================

/// Fires when the primary p-value sits just inside the significance boundary
/// (`[0.045, 0.050)`), or when a program's p-values across multiple trials
/// heap suspiciously just below 0.05, tested via a one-sided binomial tail.
#[must_use]
pub fn s8_p_value_cusp(study_id: &str, card: &StudyCardFields, program_p_values: &[f64]) -> SignalResult {
    if let Some(p) = card.primary_result.itt.p {
        if (0.045..0.050).contains(&p) {
            return SignalResult {
                signal_id: SignalId::new("S8"),
                fired: true,
                severity: Severity::Medium,
                value: Some(p),
                reason: format!("primary p-value {p:.4} sits just inside the significance cusp"),
                evidence_spans: vec![evidence(study_id, format!("p={p:.4}"))],
                low_cert_inputs: false,
            };
        }
    }
    if program_p_values.len() < 5 {
        return SignalResult::not_fired("S8");
    }
    let heaped = program_p_values
        .iter()
        .filter(|p| (0.03..0.05).contains(*p))
        .count();
    let n = program_p_values.len();
    let expected_rate = 0.02 / 0.5;
    let binomial_tail = upper_tail_binomial(heaped, n, expected_rate);
    if binomial_tail < 0.05 {
        SignalResult {
            signal_id: SignalId::new("S8"),
            fired: true,
            severity: Severity::High,
            value: Some(binomial_tail),
            reason: format!("{heaped}/{n} program p-values heap just below 0.05 (tail p={binomial_tail:.4})"),
            evidence_spans: vec![evidence(study_id, "p-value heaping across program")],
            low_cert_inputs: false,
        }
    } else {
        SignalResult::not_fired("S8")
    }
}

/// `P(X >= k)` for `X ~ Binomial(n, rate)`, computed directly since `n` is
/// always small (a program's trial count).
fn upper_tail_binomial(k: usize, n: usize, rate: f64) -> f64 {
    (k..=n).map(|i| binomial_pmf(i, n, rate)).sum()
}

fn binomial_pmf(k: usize, n: usize, rate: f64) -> f64 {
    let coefficient = binomial_coefficient(n, k);
    coefficient * rate.powi(i32::try_from(k).unwrap_or(i32::MAX)) * (1.0 - rate).powi(i32::try_from(n - k).unwrap_or(i32::MAX))
}

fn binomial_coefficient(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut result = 1.0_f64;
    for i in 0..k {
        result *= (n - i) as f64 / (i + 1) as f64;
    }
    result
}

// ============================================================================
// SECTION: S9 — OS/PFS Contradiction
// ============================================================================

/// Fires when progression-free survival improved significantly but overall
/// survival shows a worsening hazard ratio, and crossover does not plausibly
/// explain the discrepancy.
#[must_use]
pub fn s9_os_pfs_contradiction(study_id: &str, card: &StudyCardFields) -> SignalResult {
    let (Some(pfs), Some(os)) = (&card.pfs, &card.os) else {
        return SignalResult::not_fired("S9");
    };
    let pfs_significant = pfs.p.is_some_and(|p| p < 0.05) && pfs.hr.is_some_and(|hr| hr < 1.0);
    let Some(os_hr) = os.hr else {
        return SignalResult::not_fired("S9");
    };
    if !pfs_significant || os_hr <= 1.0 {
        return SignalResult::not_fired("S9");
    }
    let crossover = os.crossover_rate.unwrap_or(0.0);
    if crossover > 0.30 {
        return SignalResult::not_fired("S9");
    }
    let events_mature = os.events_frac.unwrap_or(0.0) >= 0.60;
    if !events_mature {
        return SignalResult::not_fired("S9");
    }
    let severity = if os_hr >= 1.20 {
        Severity::High
    } else if os_hr >= 1.10 {
        Severity::Medium
    } else {
        return SignalResult::not_fired("S9");
    };
    SignalResult {
        signal_id: SignalId::new("S9"),
        fired: true,
        severity,
        value: Some(os_hr),
        reason: format!(
            "PFS improved (p={:.3}, HR={:.2}) while OS worsened (HR={os_hr:.2}) with only {crossover:.2} crossover",
            pfs.p.unwrap_or(f64::NAN),
            pfs.hr.unwrap_or(f64::NAN)
        ),
        evidence_spans: vec![evidence(study_id, format!("os_hr={os_hr:.2}"))],
        low_cert_inputs: false,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::study_card::AnalysisPlan;
    use crate::study_card::ArmResult;
    use crate::study_card::ArmStats;
    use crate::study_card::Arms;
    use crate::study_card::PrimaryResult;
    use crate::study_card::PrimaryType;
    use crate::study_card::Subgroup;
    use crate::study_card::SurvivalEndpoint;

    #[test]
    fn phi_matches_known_values() {
        assert!((phi(0.0) - 0.5).abs() < 1e-6);
        assert!((phi(1.959_964) - 0.975).abs() < 1e-3);
    }

    #[test]
    fn phi_inv_round_trips_phi() {
        for p in [0.025, 0.1, 0.5, 0.9, 0.975] {
            let z = phi_inv(p);
            assert!((phi(z) - p).abs() < 1e-4, "p={p} z={z} phi(z)={}", phi(z));
        }
    }

    #[test]
    fn s2_flags_underpowered_proportion_design() {
        let card = StudyCardFields {
            primary_type: Some(PrimaryType::Proportion),
            arms: Arms {
                t: Some(ArmStats { n: Some(40), dropout: None }),
                c: Some(ArmStats { n: Some(40), dropout: None }),
            },
            analysis_plan: AnalysisPlan {
                alpha: Some(0.05),
                one_sided: Some(false),
                assumed_p_c: Some(0.3),
                assumed_delta_abs: Some(0.1),
                ..AnalysisPlan::default()
            },
            ..StudyCardFields::default()
        };
        let result = s2_underpowered("study-1", &card);
        assert!(result.fired);
        assert!(!result.low_cert_inputs);
    }

    #[test]
    fn s2_flags_low_certainty_when_inputs_missing() {
        let card = StudyCardFields {
            primary_type: Some(PrimaryType::Tte),
            n_total: Some(200),
            ..StudyCardFields::default()
        };
        let result = s2_underpowered("study-1", &card);
        assert!(result.low_cert_inputs);
    }

    #[test]
    fn s3_fires_on_unadjusted_highlighted_subgroup() {
        let card = StudyCardFields {
            narrative_highlights_subgroup: true,
            subgroups: vec![Subgroup {
                name: "age >= 65".to_string(),
                p: Some(0.03),
                adjusted: false,
                pre_specified_interaction: false,
            }],
            ..StudyCardFields::default()
        };
        let result = s3_subgroup_multiplicity("study-1", &card);
        assert!(result.fired);
        assert_eq!(result.severity, Severity::Medium);
    }

    #[test]
    fn s3_does_not_fire_when_not_highlighted() {
        let card = StudyCardFields {
            narrative_highlights_subgroup: false,
            subgroups: vec![Subgroup {
                name: "age >= 65".to_string(),
                p: Some(0.03),
                adjusted: false,
                pre_specified_interaction: false,
            }],
            ..StudyCardFields::default()
        };
        assert!(!s3_subgroup_multiplicity("study-1", &card).fired);
    }

    #[test]
    fn s4_fires_on_discordant_results_with_dropout_asymmetry() {
        let card = StudyCardFields {
            primary_result: PrimaryResult {
                itt: ArmResult { p: Some(0.04), estimate: None },
                pp: Some(ArmResult { p: Some(0.20), estimate: None }),
                effect_size: None,
            },
            arms: Arms {
                t: Some(ArmStats { n: None, dropout: Some(0.25) }),
                c: Some(ArmStats { n: None, dropout: Some(0.05) }),
            },
            ..StudyCardFields::default()
        };
        let result = s4_itt_pp_contradiction("study-1", &card);
        assert!(result.fired);
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn s5_fires_above_p90() {
        let card = StudyCardFields {
            primary_result: PrimaryResult {
                itt: ArmResult::default(),
                pp: None,
                effect_size: Some(0.5),
            },
            ..StudyCardFields::default()
        };
        let result = s5_implausible_effect("study-1", &card, 0.2, 0.4);
        assert!(result.fired);
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn s6_fires_on_undocumented_extra_peeks() {
        let card = StudyCardFields {
            actual_peeks: 3,
            analysis_plan: AnalysisPlan { planned_interims: 1, ..AnalysisPlan::default() },
            ..StudyCardFields::default()
        };
        let result = s6_interim_alpha_spending("study-1", &card);
        assert!(result.fired);
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn s6_does_not_fire_when_spending_documented() {
        let card = StudyCardFields {
            actual_peeks: 3,
            analysis_plan: AnalysisPlan {
                planned_interims: 1,
                alpha_spending: Some("obrien-fleming".to_string()),
                ..AnalysisPlan::default()
            },
            ..StudyCardFields::default()
        };
        assert!(!s6_interim_alpha_spending("study-1", &card).fired);
    }

    #[test]
    fn s7_fires_on_single_arm_pivotal_against_rct_standard() {
        let card = StudyCardFields {
            single_arm: true,
            is_pivotal: true,
            ..StudyCardFields::default()
        };
        assert!(s7_single_arm_vs_rct_standard("study-1", &card, true).fired);
        assert!(!s7_single_arm_vs_rct_standard("study-1", &card, false).fired);
    }

    #[test]
    fn s8_fires_on_cusp_p_value() {
        let card = StudyCardFields {
            primary_result: PrimaryResult {
                itt: ArmResult { p: Some(0.048), estimate: None },
                pp: None,
                effect_size: None,
            },
            ..StudyCardFields::default()
        };
        let result = s8_p_value_cusp("study-1", &card, &[]);
        assert!(result.fired);
    }

    #[test]
    fn s9_fires_on_os_pfs_contradiction() {
        let card = StudyCardFields {
            pfs: Some(SurvivalEndpoint {
                p: Some(0.01),
                hr: Some(0.6),
                ci95_upper: None,
                events_frac: None,
                crossover_rate: None,
            }),
            os: Some(SurvivalEndpoint {
                p: None,
                hr: Some(1.25),
                ci95_upper: None,
                events_frac: Some(0.7),
                crossover_rate: Some(0.1),
            }),
            ..StudyCardFields::default()
        };
        let result = s9_os_pfs_contradiction("study-1", &card);
        assert!(result.fired);
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn s9_does_not_fire_with_high_crossover() {
        let card = StudyCardFields {
            pfs: Some(SurvivalEndpoint {
                p: Some(0.01),
                hr: Some(0.6),
                ci95_upper: None,
                events_frac: None,
                crossover_rate: None,
            }),
            os: Some(SurvivalEndpoint {
                p: None,
                hr: Some(1.25),
                ci95_upper: None,
                events_frac: Some(0.7),
                crossover_rate: Some(0.5),
            }),
            ..StudyCardFields::default()
        };
        assert!(!s9_os_pfs_contradiction("study-1", &card).fired);
    }
}
