// system-tests/tests/pipeline.rs
// ============================================================================
// Module: End-to-End Pipeline Test
// Description: Drives ingestion, sponsor resolution, scoring, and catalyst
//              inference through one trial, store-backed throughout.
// Purpose: Exercise the full ingest -> resolve -> score -> catalyst path
//          across crate boundaries, the way a single `trial-cli` session
//          would.
// Dependencies: trial-broker, trial-config, trial-core, trial-engine,
//               trial-store-sqlite
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Mutex;

use serde_json::json;
use time::macros::date;
use trial_broker::CancellationToken;
use trial_broker::IngestOrchestrator;
use trial_broker::score_and_persist;
use trial_config::ChangeDetectorConfig;
use trial_config::GateConfig;
use trial_config::ResolverConfig;
use trial_core::NctId;
use trial_core::RegistryClient;
use trial_core::RegistryError;
use trial_core::RegistryPage;
use trial_core::ResolverStore;
use trial_core::RunId;
use trial_core::ScoreStore;
use trial_engine::GateEngineConfig;
use trial_engine::PriorContext;
use trial_engine::ResolverOutcome;
use trial_engine::infer_catalyst_window;
use trial_engine::resolve_sponsor;
use trial_store_sqlite::SqliteStore;
use trial_store_sqlite::SqliteStoreConfig;

struct StubRegistry {
    pages: Mutex<Vec<RegistryPage>>,
}

impl RegistryClient for StubRegistry {
    fn fetch_page(&self, _page_token: Option<&str>) -> Result<RegistryPage, RegistryError> {
        let mut pages = self.pages.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(pages.pop().unwrap_or(RegistryPage { records: Vec::new(), next_page_token: None }))
    }
}

fn sample_record(nct: &str, sponsor: &str) -> serde_json::Value {
    json!({
        "protocolSection": {
            "identificationModule": {"nctId": nct},
            "sponsorCollaboratorsModule": {"leadSponsor": {"name": sponsor}},
        }
    })
}

#[test]
fn a_trial_can_be_ingested_resolved_scored_and_windowed_end_to_end() {
    let store = SqliteStore::open(SqliteStoreConfig::in_memory()).unwrap();

    let registry = StubRegistry {
        pages: Mutex::new(vec![RegistryPage {
            records: vec![sample_record("NCT01234567", "Acme Biotech Inc")],
            next_page_token: None,
        }]),
    };
    let change_detector_config = ChangeDetectorConfig::default();
    let orchestrator =
        IngestOrchestrator::new(&registry, &store, &change_detector_config, CancellationToken::new());
    let ingest_report = orchestrator.run_batch().unwrap();
    assert_eq!(ingest_report.outcomes.len(), 1);
    assert!(ingest_report.outcomes[0].appended);
    let trial_id = ingest_report.outcomes[0].trial_id;

    let company = store.upsert_company("Acme Biotech", "acme biotech", Some("ACME")).unwrap();
    let trial = store.get_trial(trial_id).unwrap().unwrap();
    let companies = store.list_companies().unwrap();
    let resolver_config = ResolverConfig::default();
    let outcome = resolve_sponsor(&trial.sponsor_text, &companies, &resolver_config);
    let acceptance = match outcome {
        ResolverOutcome::Accept(acceptance) => acceptance,
        other => panic!("expected an accepted resolution, got {other:?}"),
    };
    assert_eq!(acceptance.company_id, company.id);
    let decision = trial_core::ResolverDecisionRecord {
        run_id: RunId::new("run-pipeline"),
        nct_id: NctId::new("NCT01234567"),
        sponsor_text: trial.sponsor_text.clone(),
        mode: trial_core::ResolverDecisionMode::Accept,
        company_id: Some(acceptance.company_id),
        probability: acceptance.probability,
        top2_margin: acceptance.top2_margin,
        features: acceptance.features,
        leader_meta: serde_json::Value::Null,
        decided_by: "auto".to_string(),
        notes: None,
        created_at: time::OffsetDateTime::now_utc(),
    };
    store.write_decision(&decision).unwrap();

    let gate_config = GateEngineConfig::from_config(&GateConfig::default()).unwrap();
    let score = score_and_persist(
        &store,
        trial_id,
        RunId::new("run-pipeline"),
        &[],
        &BTreeSet::new(),
        PriorContext::default(),
        &gate_config,
    )
    .unwrap();
    assert_eq!(store.latest_score(trial_id).unwrap(), Some(score));

    let epcd = date!(2027 - 03 - 15);
    let now = time::OffsetDateTime::now_utc();
    let slip = trial_core::SlipStats { mean_slip_days: 30, p10_days: 10, p90_days: 90, n_events: 12 };
    let window = infer_catalyst_window(trial_id, epcd, 45, &[], slip, now, None);
    store.upsert_catalyst_window(&window).unwrap();
    let persisted = store.get_catalyst_window(trial_id).unwrap();
    assert_eq!(persisted, Some(window));
}

#[test]
fn reingesting_after_a_material_change_records_a_second_version_with_changes() {
    let store = SqliteStore::open(SqliteStoreConfig::in_memory()).unwrap();
    let change_detector_config = ChangeDetectorConfig::default();

    let registry = StubRegistry {
        pages: Mutex::new(vec![RegistryPage {
            records: vec![sample_record("NCT07654321", "Globex Therapeutics")],
            next_page_token: None,
        }]),
    };
    let orchestrator =
        IngestOrchestrator::new(&registry, &store, &change_detector_config, CancellationToken::new());
    orchestrator.run_batch().unwrap();

    let mut changed = sample_record("NCT07654321", "Globex Therapeutics");
    changed["protocolSection"]["identificationModule"]["briefTitle"] = json!("A materially revised brief title");
    *registry.pages.lock().unwrap() = vec![RegistryPage { records: vec![changed], next_page_token: None }];
    let second_report = orchestrator.run_batch().unwrap();
    assert!(second_report.outcomes[0].appended);
}
