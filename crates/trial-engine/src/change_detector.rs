// crates/trial-engine/src/change_detector.rs
// ============================================================================
// Module: Change Detector
// Description: Field-level diff between two consecutive trial versions.
// Purpose: Produce the changes bag a new `TrialVersion` carries.
// Dependencies: time, trial-config, trial-core
// Grounded on: original_source/src/ncfd/ingest/ctgov_change_detector.py
// ============================================================================

//! ## Overview
//! The change detector compares two [`TrialVersionScalars`] snapshots field
//! by field, classifying each difference by significance (`spec.md` §4.3)
//! and flagging numeric changes below the configured relative threshold as
//! immaterial rather than dropping them. A change is `is_late` when it was
//! recorded after the trial's previously-known estimated primary completion
//! date had already passed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::Date;
use trial_config::ChangeDetectorConfig;
use trial_core::ChangeDetectorError;
use trial_core::ChangeRecord;
use trial_core::ChangeSignificance;
use trial_core::ChangeType;
use trial_core::TrialId;
use trial_core::TrialVersionScalars;

// ============================================================================
// SECTION: Detection
// ============================================================================

/// Detects field-level changes between `old` and `new`, as of `observed_at`
/// (the new version's capture date, used to evaluate lateness against the
/// old version's estimated primary completion date).
///
/// # Errors
///
/// Returns [`ChangeDetectorError::MismatchedTrial`] when `old_trial_id`
/// differs from `new_trial_id`.
pub fn detect_changes(
    old_trial_id: TrialId,
    new_trial_id: TrialId,
    old: &TrialVersionScalars,
    new: &TrialVersionScalars,
    observed_at: Date,
    config: &ChangeDetectorConfig,
) -> Result<Vec<ChangeRecord>, ChangeDetectorError> {
    if old_trial_id != new_trial_id {
        return Err(ChangeDetectorError::MismatchedTrial(old_trial_id, new_trial_id));
    }
    let is_late = old
        .estimated_primary_completion_date
        .is_some_and(|epcd| epcd < observed_at);

    let mut changes = Vec::new();
    push_enum_change(&mut changes, "phase", old.phase, new.phase, ChangeSignificance::High, is_late);
    push_enum_change(
        &mut changes,
        "status",
        old.status,
        new.status,
        ChangeSignificance::High,
        is_late,
    );
    push_text_change(
        &mut changes,
        "primary_endpoint_text",
        old.primary_endpoint_text.as_deref(),
        new.primary_endpoint_text.as_deref(),
        ChangeSignificance::High,
        is_late,
    );
    push_text_change(
        &mut changes,
        "analysis_plan_text",
        old.analysis_plan_text.as_deref(),
        new.analysis_plan_text.as_deref(),
        ChangeSignificance::High,
        is_late,
    );
    push_text_change(
        &mut changes,
        "allocation",
        old.allocation.as_deref(),
        new.allocation.as_deref(),
        ChangeSignificance::High,
        is_late,
    );
    push_text_change(
        &mut changes,
        "masking",
        old.masking.as_deref(),
        new.masking.as_deref(),
        ChangeSignificance::High,
        is_late,
    );
    push_numeric_change(
        &mut changes,
        "sample_size",
        old.sample_size.map(f64::from),
        new.sample_size.map(f64::from),
        ChangeSignificance::Medium,
        is_late,
        config.numeric_change_threshold,
    );
    push_numeric_change(
        &mut changes,
        "alpha_level",
        old.alpha_level,
        new.alpha_level,
        ChangeSignificance::High,
        is_late,
        config.numeric_change_threshold,
    );
    push_numeric_change(
        &mut changes,
        "statistical_power",
        old.statistical_power,
        new.statistical_power,
        ChangeSignificance::High,
        is_late,
        config.numeric_change_threshold,
    );
    push_text_change(
        &mut changes,
        "intervention_model",
        old.intervention_model.as_deref(),
        new.intervention_model.as_deref(),
        ChangeSignificance::Medium,
        is_late,
    );
    push_date_change(
        &mut changes,
        "estimated_primary_completion_date",
        old.estimated_primary_completion_date,
        new.estimated_primary_completion_date,
        ChangeSignificance::Medium,
        is_late,
    );
    Ok(changes)
}

// ============================================================================
// SECTION: Per-Kind Comparators
// ============================================================================

fn change_type_for(old_present: bool, new_present: bool) -> ChangeType {
    match (old_present, new_present) {
        (false, true) => ChangeType::Added,
        (true, false) => ChangeType::Removed,
        _ => ChangeType::Modified,
    }
}

fn push_enum_change<T: PartialEq + std::fmt::Debug>(
    changes: &mut Vec<ChangeRecord>,
    field: &str,
    old: Option<T>,
    new: Option<T>,
    significance: ChangeSignificance,
    is_late: bool,
) {
    if old == new {
        return;
    }
    let change_type = change_type_for(old.is_some(), new.is_some());
    changes.push(ChangeRecord {
        field: field.to_string(),
        old_value: old.as_ref().map(|v| format!("{v:?}")),
        new_value: new.as_ref().map(|v| format!("{v:?}")),
        change_type,
        significance,
        is_material: true,
        is_late,
        description: format!("{field} changed"),
    });
}

fn push_text_change(
    changes: &mut Vec<ChangeRecord>,
    field: &str,
    old: Option<&str>,
    new: Option<&str>,
    significance: ChangeSignificance,
    is_late: bool,
) {
    if old == new {
        return;
    }
    let change_type = change_type_for(old.is_some(), new.is_some());
    changes.push(ChangeRecord {
        field: field.to_string(),
        old_value: old.map(str::to_string),
        new_value: new.map(str::to_string),
        change_type,
        significance,
        is_material: true,
        is_late,
        description: format!("{field} changed"),
    });
}

fn push_date_change(
    changes: &mut Vec<ChangeRecord>,
    field: &str,
    old: Option<Date>,
    new: Option<Date>,
    significance: ChangeSignificance,
    is_late: bool,
) {
    if old == new {
        return;
    }
    let change_type = change_type_for(old.is_some(), new.is_some());
    changes.push(ChangeRecord {
        field: field.to_string(),
        old_value: old.map(|d| d.to_string()),
        new_value: new.map(|d| d.to_string()),
        change_type,
        significance,
        is_material: true,
        is_late,
        description: format!("{field} changed"),
    });
}

/// Numeric fields are reported only when the relative change (against the
/// old value) meets `threshold`, or when presence itself changed.
fn push_numeric_change(
    changes: &mut Vec<ChangeRecord>,
    field: &str,
    old: Option<f64>,
    new: Option<f64>,
    significance: ChangeSignificance,
    is_late: bool,
    threshold: f64,
) {
    if old == new {
        return;
    }
    let is_material = match (old, new) {
        (Some(old), Some(new)) if old != 0.0 => ((new - old).abs() / old.abs()) >= threshold,
        _ => true,
    };
    if !is_material {
        return;
    }
    let change_type = change_type_for(old.is_some(), new.is_some());
    changes.push(ChangeRecord {
        field: field.to_string(),
        old_value: old.map(|v| v.to_string()),
        new_value: new.map(|v| v.to_string()),
        change_type,
        significance,
        is_material,
        is_late,
        description: format!("{field} changed"),
    });
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU64;
    use time::Month;
    use trial_core::TrialPhase;

    fn trial_id() -> TrialId {
        TrialId::new(NonZeroU64::new(1).unwrap())
    }

    #[test]
    fn mismatched_trial_ids_are_rejected() {
        let other = TrialId::new(NonZeroU64::new(2).unwrap());
        let result = detect_changes(
            trial_id(),
            other,
            &TrialVersionScalars::default(),
            &TrialVersionScalars::default(),
            Date::from_calendar_date(2026, Month::January, 1).unwrap(),
            &ChangeDetectorConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn phase_change_is_high_significance() {
        let old = TrialVersionScalars {
            phase: Some(TrialPhase::Phase2),
            ..TrialVersionScalars::default()
        };
        let new = TrialVersionScalars {
            phase: Some(TrialPhase::Phase3),
            ..TrialVersionScalars::default()
        };
        let changes = detect_changes(
            trial_id(),
            trial_id(),
            &old,
            &new,
            Date::from_calendar_date(2026, Month::January, 1).unwrap(),
            &ChangeDetectorConfig::default(),
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "phase");
        assert_eq!(changes[0].significance, ChangeSignificance::High);
        assert_eq!(changes[0].change_type, ChangeType::Modified);
    }

    #[test]
    fn small_numeric_change_is_suppressed() {
        let old = TrialVersionScalars {
            sample_size: Some(100),
            ..TrialVersionScalars::default()
        };
        let new = TrialVersionScalars {
            sample_size: Some(103),
            ..TrialVersionScalars::default()
        };
        let changes = detect_changes(
            trial_id(),
            trial_id(),
            &old,
            &new,
            Date::from_calendar_date(2026, Month::January, 1).unwrap(),
            &ChangeDetectorConfig::default(),
        )
        .unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn large_numeric_change_is_reported() {
        let old = TrialVersionScalars {
            sample_size: Some(100),
            ..TrialVersionScalars::default()
        };
        let new = TrialVersionScalars {
            sample_size: Some(200),
            ..TrialVersionScalars::default()
        };
        let changes = detect_changes(
            trial_id(),
            trial_id(),
            &old,
            &new,
            Date::from_calendar_date(2026, Month::January, 1).unwrap(),
            &ChangeDetectorConfig::default(),
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Modified);
    }

    #[test]
    fn swapping_old_and_new_only_flips_change_type_direction() {
        let old = TrialVersionScalars {
            sample_size: Some(100),
            ..TrialVersionScalars::default()
        };
        let new = TrialVersionScalars {
            sample_size: None,
            ..TrialVersionScalars::default()
        };
        let forward = detect_changes(
            trial_id(),
            trial_id(),
            &old,
            &new,
            Date::from_calendar_date(2026, Month::January, 1).unwrap(),
            &ChangeDetectorConfig::default(),
        )
        .unwrap();
        let backward = detect_changes(
            trial_id(),
            trial_id(),
            &new,
            &old,
            Date::from_calendar_date(2026, Month::January, 1).unwrap(),
            &ChangeDetectorConfig::default(),
        )
        .unwrap();
        assert_eq!(forward[0].change_type, ChangeType::Removed);
        assert_eq!(backward[0].change_type, ChangeType::Added);
        assert_eq!(forward[0].significance, backward[0].significance);
    }
}
