// crates/trial-broker/src/scoring.rs
// ============================================================================
// Module: Scoring Assembly
// Description: Turns one gate/posterior engine run into a persisted
//              ScoreResult.
// Purpose: Own the run-id stamping and write-through that belongs to the
//          orchestration layer, not the pure gate/posterior engine.
// Dependencies: trial-core, trial-engine, trial-store-sqlite
// Grounded on: spec.md §4.7 (the engine emits a PosteriorResult; a run_id
//              and created_at are assembly-layer concerns) and
//              trial-core::core::score::ScoreResult's field shape.
// ============================================================================

//! ## Overview
//! [`score_and_persist`] wraps [`trial_engine::evaluate_gates`]'s
//! [`PosteriorResult`] with a `trial_id`, `run_id`, and `created_at`, then
//! writes the resulting [`ScoreResult`] through [`ScoreStore::write_score`].
//! A duplicate `(trial_id, run_id)` write is reported back to the caller
//! rather than retried; retrying a content-identical duplicate would not
//! change the outcome.

use std::collections::BTreeSet;

use time::OffsetDateTime;
use trial_core::RunId;
use trial_core::ScoreResult;
use trial_core::ScoreStore;
use trial_core::ScoreStoreError;
use trial_core::TrialId;
use trial_engine::GateEngineConfig;
use trial_engine::PosteriorResult;
use trial_engine::PriorContext;
use trial_engine::SignalResult;
use trial_engine::evaluate_gates;

/// Evaluates `G1`..`G4` and the posterior over `signals`, then persists the
/// result under `(trial_id, run_id)`.
///
/// # Errors
///
/// Returns [`ScoreStoreError::DuplicateScore`] when this `(trial_id,
/// run_id)` pair was already written, or [`ScoreStoreError::Backend`] on a
/// storage failure.
pub fn score_and_persist(
    store: &impl ScoreStore,
    trial_id: TrialId,
    run_id: RunId,
    signals: &[SignalResult],
    stop_rule_flags: &BTreeSet<String>,
    prior_context: PriorContext,
    config: &GateEngineConfig,
) -> Result<ScoreResult, ScoreStoreError> {
    let posterior = evaluate_gates(signals, stop_rule_flags, prior_context, config);
    let score = assemble(trial_id, run_id, posterior);
    store.write_score(&score)?;
    Ok(score)
}

fn assemble(trial_id: TrialId, run_id: RunId, posterior: PosteriorResult) -> ScoreResult {
    ScoreResult {
        trial_id,
        run_id,
        prior: posterior.prior,
        logit_prior: posterior.logit_prior,
        sum_log_lr: posterior.sum_log_lr,
        logit_post: posterior.logit_post,
        p_fail: posterior.p_fail,
        gate_evals: posterior.gate_evals,
        stop_rules_applied: posterior.stop_rules_applied,
        evidence_spans: posterior.evidence_spans,
        created_at: OffsetDateTime::now_utc(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use trial_config::GateConfig;
    use trial_core::NctId;
    use trial_core::RunId;
    use trial_core::ScoreStoreError;
    use trial_engine::GateEngineConfig;
    use trial_engine::PriorContext;
    use trial_store_sqlite::SqliteStore;
    use trial_store_sqlite::SqliteStoreConfig;

    use super::score_and_persist;

    #[test]
    fn scores_with_no_fired_signals_persist_and_read_back() {
        let store = SqliteStore::open(SqliteStoreConfig::in_memory()).unwrap();
        let trial = store.ensure_trial(&NctId::new("NCT00000005"), "Acme Biotech").unwrap();
        let config = GateEngineConfig::from_config(&GateConfig::default()).unwrap();
        let score = score_and_persist(
            &store,
            trial.id,
            RunId::new("run-1"),
            &[],
            &BTreeSet::new(),
            PriorContext::default(),
            &config,
        )
        .unwrap();
        assert_eq!(score.trial_id, trial.id);
        let latest = store.latest_score(trial.id).unwrap();
        assert_eq!(latest, Some(score));
    }

    #[test]
    fn writing_the_same_run_id_twice_is_rejected_as_duplicate() {
        let store = SqliteStore::open(SqliteStoreConfig::in_memory()).unwrap();
        let trial = store.ensure_trial(&NctId::new("NCT00000006"), "Acme Biotech").unwrap();
        let config = GateEngineConfig::from_config(&GateConfig::default()).unwrap();
        let run_id = RunId::new("run-dup");
        score_and_persist(&store, trial.id, run_id.clone(), &[], &BTreeSet::new(), PriorContext::default(), &config)
            .unwrap();
        let result =
            score_and_persist(&store, trial.id, run_id, &[], &BTreeSet::new(), PriorContext::default(), &config);
        assert!(matches!(result, Err(ScoreStoreError::DuplicateScore { .. })));
    }
}
