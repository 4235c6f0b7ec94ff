// crates/trial-engine/src/normalize.rs
// ============================================================================
// Module: Trial Normalizer
// Description: Extracts scalar fields from a raw registry record.
// Purpose: Turn an opaque registry JSON bag into a typed, best-effort view
//          without ever throwing on a missing or malformed field.
// Dependencies: serde_json, time, trial-core
// ============================================================================

//! ## Overview
//! The normalizer reads the upstream registry record's `protocolSection`
//! tree (the same shape `trial-providers::registry` already filters on) and
//! extracts the scalar fields the rest of the engine reasons over. Every
//! extraction is tolerant: a missing or unparsable value yields `None`
//! rather than an error, since a partial record is still worth storing and
//! scoring on what it does carry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use serde_json::Value;
use time::Date;
use time::format_description::well_known::Iso8601;
use trial_core::InterventionType;
use trial_core::NctId;
use trial_core::TrialPhase;
use trial_core::TrialStatus;
use trial_core::TrialVersionScalars;

// ============================================================================
// SECTION: Normalized Identity
// ============================================================================

/// The identity fields a raw record carries, extracted ahead of the
/// version store's `ensure_trial` call.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedIdentity {
    /// ClinicalTrials.gov accession number.
    pub nct_id: NctId,
    /// Free-text lead sponsor name, pre-resolution.
    pub sponsor_text: String,
}

/// Extracts the identity fields required to ensure a trial row exists.
///
/// Returns `None` when the record carries no NCT accession at all; a
/// record missing only its sponsor name still normalizes, with an empty
/// sponsor string that the resolver will reject at the academic/unknown
/// boundary.
#[must_use]
pub fn normalize_identity(raw: &Value) -> Option<NormalizedIdentity> {
    let nct_id = raw
        .pointer("/protocolSection/identificationModule/nctId")
        .and_then(Value::as_str)?;
    let sponsor_text = raw
        .pointer("/protocolSection/sponsorCollaboratorsModule/leadSponsor/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(NormalizedIdentity {
        nct_id: NctId::new(nct_id),
        sponsor_text,
    })
}

// ============================================================================
// SECTION: Scalar Extraction
// ============================================================================

/// Extracts the scalar view of a raw registry record. Never fails; every
/// field independently degrades to `None` on absence or malformed input.
#[must_use]
pub fn normalize_scalars(raw: &Value) -> TrialVersionScalars {
    TrialVersionScalars {
        phase: extract_phase(raw),
        status: extract_status(raw),
        primary_endpoint_text: extract_primary_endpoint_text(raw),
        sample_size: extract_sample_size(raw),
        analysis_plan_text: extract_analysis_plan_text(raw),
        estimated_primary_completion_date: extract_primary_completion_date(raw),
        allocation: extract_string(raw, "/protocolSection/designModule/designInfo/allocation"),
        masking: extract_masking(raw),
        intervention_model: extract_string(
            raw,
            "/protocolSection/designModule/designInfo/interventionModel",
        ),
        alpha_level: None,
        statistical_power: None,
        intervention_type: extract_intervention_type(raw),
    }
}

fn extract_string(raw: &Value, pointer: &str) -> Option<String> {
    raw.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

fn extract_phase(raw: &Value) -> Option<TrialPhase> {
    raw.pointer("/protocolSection/designModule/phases")
        .and_then(Value::as_array)
        .and_then(|phases| phases.first())
        .and_then(Value::as_str)
        .and_then(|text| TrialPhase::from_str(text).ok())
}

fn extract_status(raw: &Value) -> Option<TrialStatus> {
    raw.pointer("/protocolSection/statusModule/overallStatus")
        .and_then(Value::as_str)
        .and_then(|text| TrialStatus::from_str(text).ok())
}

fn extract_primary_endpoint_text(raw: &Value) -> Option<String> {
    let outcomes = raw
        .pointer("/protocolSection/outcomesModule/primaryOutcomes")
        .and_then(Value::as_array)?;
    let parts: Vec<String> = outcomes
        .iter()
        .filter_map(|outcome| {
            let measure = outcome.get("measure").and_then(Value::as_str)?.trim();
            if measure.is_empty() {
                return None;
            }
            let timeframe = outcome.get("timeFrame").and_then(Value::as_str);
            Some(match timeframe {
                Some(timeframe) if !timeframe.trim().is_empty() => {
                    format!("{measure} ({timeframe})")
                }
                _ => measure.to_string(),
            })
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn extract_sample_size(raw: &Value) -> Option<u32> {
    raw.pointer("/protocolSection/designModule/enrollmentInfo/count")
        .and_then(Value::as_u64)
        .and_then(|count| u32::try_from(count).ok())
}

fn extract_analysis_plan_text(raw: &Value) -> Option<String> {
    extract_string(
        raw,
        "/protocolSection/outcomesModule/primaryOutcomes/0/description",
    )
}

fn extract_primary_completion_date(raw: &Value) -> Option<Date> {
    let text = raw
        .pointer("/protocolSection/statusModule/primaryCompletionDateStruct/date")
        .and_then(Value::as_str)?;
    parse_registry_date(text)
}

/// Parses a `CT.gov`-style date, which is `YYYY-MM-DD` or the coarser
/// `YYYY-MM`; the latter is anchored to the first of the month since the
/// engine only ever compares and offsets dates, never displays day-level
/// precision for these coarse inputs.
fn parse_registry_date(text: &str) -> Option<Date> {
    if let Ok(date) = Date::parse(text, &Iso8601::DATE) {
        return Some(date);
    }
    let padded = format!("{text}-01");
    Date::parse(&padded, &Iso8601::DATE).ok()
}

fn extract_masking(raw: &Value) -> Option<String> {
    let masking = extract_string(raw, "/protocolSection/designModule/designInfo/maskingInfo/masking")?;
    let roles = raw
        .pointer("/protocolSection/designModule/designInfo/maskingInfo/whoMasked")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|roles| !roles.is_empty());
    Some(match roles {
        Some(roles) => format!("{masking} ({roles})"),
        None => masking,
    })
}

fn extract_intervention_type(raw: &Value) -> Option<InterventionType> {
    let interventions = raw
        .pointer("/protocolSection/armsInterventionsModule/interventions")
        .and_then(Value::as_array)?;
    let mut types: Vec<InterventionType> = interventions
        .iter()
        .filter_map(|intervention| intervention.get("type").and_then(Value::as_str))
        .map(intervention_type_from_registry)
        .collect();
    types.dedup();
    match types.as_slice() {
        [single] => Some(*single),
        _ => None,
    }
}

fn intervention_type_from_registry(text: &str) -> InterventionType {
    match text.to_ascii_uppercase().as_str() {
        "DRUG" => InterventionType::Drug,
        "BIOLOGICAL" => InterventionType::Biological,
        "DEVICE" => InterventionType::Device,
        "PROCEDURE" => InterventionType::Procedure,
        _ => InterventionType::Other,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> Value {
        json!({
            "protocolSection": {
                "identificationModule": {"nctId": "NCT01234567"},
                "sponsorCollaboratorsModule": {"leadSponsor": {"name": "Acme Biotech Inc."}},
                "statusModule": {
                    "overallStatus": "RECRUITING",
                    "primaryCompletionDateStruct": {"date": "2026-03"}
                },
                "designModule": {
                    "phases": ["PHASE3"],
                    "enrollmentInfo": {"count": 400},
                    "designInfo": {
                        "allocation": "RANDOMIZED",
                        "interventionModel": "PARALLEL",
                        "maskingInfo": {"masking": "DOUBLE", "whoMasked": ["PARTICIPANT", "INVESTIGATOR"]}
                    }
                },
                "armsInterventionsModule": {
                    "interventions": [{"type": "DRUG", "name": "ACME-123"}]
                },
                "outcomesModule": {
                    "primaryOutcomes": [{"measure": "Overall survival", "timeFrame": "24 months"}]
                }
            }
        })
    }

    #[test]
    fn extracts_identity() {
        let identity = normalize_identity(&sample_record()).unwrap();
        assert_eq!(identity.nct_id.as_str(), "NCT01234567");
        assert_eq!(identity.sponsor_text, "Acme Biotech Inc.");
    }

    #[test]
    fn missing_nct_id_normalizes_to_none() {
        assert!(normalize_identity(&json!({})).is_none());
    }

    #[test]
    fn extracts_scalars() {
        let scalars = normalize_scalars(&sample_record());
        assert_eq!(scalars.phase, Some(TrialPhase::Phase3));
        assert_eq!(scalars.status, Some(TrialStatus::Recruiting));
        assert_eq!(scalars.sample_size, Some(400));
        assert_eq!(scalars.allocation.as_deref(), Some("RANDOMIZED"));
        assert_eq!(scalars.masking.as_deref(), Some("DOUBLE (PARTICIPANT, INVESTIGATOR)"));
        assert_eq!(scalars.intervention_type, Some(InterventionType::Drug));
        assert_eq!(
            scalars.primary_endpoint_text.as_deref(),
            Some("Overall survival (24 months)")
        );
        assert_eq!(
            scalars.estimated_primary_completion_date,
            Some(Date::from_calendar_date(2026, time::Month::March, 1).unwrap())
        );
    }

    #[test]
    fn malformed_record_normalizes_to_all_none() {
        let scalars = normalize_scalars(&json!({"protocolSection": {"designModule": "not an object"}}));
        assert_eq!(scalars, TrialVersionScalars::default());
    }
}
