// crates/trial-broker/src/ingest.rs
// ============================================================================
// Module: Ingestion Orchestrator
// Description: Pages the registry client, normalizing, versioning, and
//              change-detecting each returned trial in its own scope.
// Purpose: Drive a full since-date ingestion batch with cooperative
//          cancellation, per-trial retry, and a failure that never aborts
//          the rest of the batch.
// Dependencies: trial-core, trial-engine, trial-store-sqlite
// Grounded on: spec.md §5 (scheduling model, suspension points, ordering
//              guarantees, shared-resource policy, cancellation/timeouts,
//              idempotency) and decision-gate-broker's composite-dispatcher
//              shape (one pluggable collaborator driving per-item work,
//              errors from one item never aborting the others).
// ============================================================================

//! ## Overview
//! [`IngestOrchestrator::run_batch`] pages through [`RegistryClient::
//! fetch_page`] and, for each returned raw record, normalizes its identity,
//! ensures a [`Trial`] row exists, records a new version iff its content
//! hash changed, and — only on an actual append — detects field-level
//! changes against the immediately preceding version. A single trial's
//! failure is collected into the batch report rather than aborting the
//! rest of the page; the cancellation token is checked between pages and
//! between trials within a page.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use time::OffsetDateTime;
use trial_config::ChangeDetectorConfig;
use trial_core::ChangeDetectorError;
use trial_core::NctId;
use trial_core::RegistryClient;
use trial_core::RegistryError;
use trial_core::TrialId;
use trial_core::VersionStoreError;
use trial_engine::normalize_identity;
use trial_engine::normalize_scalars;
use trial_store_sqlite::SqliteStore;
use trial_store_sqlite::SqliteStoreError;

use crate::cancellation::CancellationToken;
use crate::retry::RetryBudget;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors surfaced by the ingestion orchestrator.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The registry client failed in a way its own retry policy gave up on.
    #[error("registry fetch failed: {0}")]
    Registry(#[from] RegistryError),
}

/// Why a single trial's ingestion failed; collected in the batch report
/// rather than propagated, so one bad record does not abort the batch.
#[derive(Debug, Error)]
pub enum TrialIngestError {
    /// The raw record carried no NCT accession at all.
    #[error("record has no NCT accession")]
    MissingIdentity,
    /// The store rejected the write.
    #[error("store error: {0}")]
    Store(#[from] SqliteStoreError),
    /// Change detection rejected mismatched trial ids (should be
    /// unreachable, since both sides come from the same trial).
    #[error("change detection error: {0}")]
    ChangeDetector(#[from] ChangeDetectorError),
}

impl From<VersionStoreError> for TrialIngestError {
    fn from(error: VersionStoreError) -> Self {
        Self::Store(SqliteStoreError::Db(error.to_string()))
    }
}

// ============================================================================
// SECTION: Batch Report
// ============================================================================

/// One trial's ingestion outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialIngestOutcome {
    /// The trial's surrogate key.
    pub trial_id: TrialId,
    /// The trial's NCT accession.
    pub nct_id: NctId,
    /// Whether a new version row was actually appended (`false` when the
    /// content hash matched the prior version, the idempotency guard).
    pub appended: bool,
    /// Number of field-level changes detected against the prior version;
    /// always `0` for a trial's first version or an unchanged re-fetch.
    pub change_count: usize,
}

/// Summary of one `run_batch` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestBatchReport {
    /// Pages successfully fetched before the batch ended.
    pub pages_fetched: usize,
    /// Records returned across every fetched page.
    pub records_seen: usize,
    /// Per-trial outcomes for records that ingested successfully.
    pub outcomes: Vec<TrialIngestOutcome>,
    /// Records that failed to ingest, paired with why.
    pub failures: Vec<(String, TrialIngestError)>,
    /// Whether the batch stopped early because of cancellation.
    pub cancelled: bool,
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Pages a registry client and ingests each returned trial into the store.
pub struct IngestOrchestrator<'a, R: RegistryClient> {
    registry: &'a R,
    store: &'a SqliteStore,
    change_detector_config: &'a ChangeDetectorConfig,
    cancel: CancellationToken,
}

impl<'a, R: RegistryClient> IngestOrchestrator<'a, R> {
    /// Creates an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(
        registry: &'a R,
        store: &'a SqliteStore,
        change_detector_config: &'a ChangeDetectorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self { registry, store, change_detector_config, cancel }
    }

    /// Pages through the registry from the first page until the registry
    /// reports no further continuation token, ingesting every returned
    /// record. Stops early, without error, when cancellation is requested.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] only when the registry client itself fails
    /// (its own retry policy has already been exhausted); a single trial's
    /// ingestion failure is collected in the report instead.
    pub fn run_batch(&self) -> Result<IngestBatchReport, IngestError> {
        let mut report = IngestBatchReport::default();
        let mut page_token: Option<String> = None;
        loop {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let page = self.registry.fetch_page(page_token.as_deref())?;
            report.pages_fetched += 1;
            report.records_seen += page.records.len();
            for raw in page.records {
                if self.cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                let mut budget = RetryBudget::new();
                match budget.retry(|| self.ingest_one(raw.clone()), is_transient_store_error) {
                    Ok(outcome) => report.outcomes.push(outcome),
                    Err(err) => {
                        let label = raw
                            .pointer("/protocolSection/identificationModule/nctId")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or("<unidentified>")
                            .to_string();
                        report.failures.push((label, err));
                    }
                }
            }
            if report.cancelled {
                break;
            }
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        Ok(report)
    }

    /// Ingests one raw registry record: identity, trial row, version,
    /// changes. All store writes for this trial are scoped to this call;
    /// a failure here leaves no partial state beyond what the store's own
    /// per-trial savepoints already guarantee.
    fn ingest_one(&self, raw: serde_json::Value) -> Result<TrialIngestOutcome, TrialIngestError> {
        let identity = normalize_identity(&raw).ok_or(TrialIngestError::MissingIdentity)?;
        let trial = self.store.ensure_trial(&identity.nct_id, &identity.sponsor_text)?;
        let prior = self.store.latest_version(trial.id)?;
        let (_, appended) = self.store.record_version(trial.id, raw.clone())?;
        let mut change_count = 0;
        if appended {
            let new_scalars = normalize_scalars(&raw);
            let changes = match &prior {
                Some(prior_version) => trial_engine::detect_changes(
                    trial.id,
                    trial.id,
                    &prior_version.scalars,
                    &new_scalars,
                    OffsetDateTime::now_utc().date(),
                    self.change_detector_config,
                )?,
                None => Vec::new(),
            };
            change_count = changes.len();
            self.store.record_version_scalars(trial.id, &new_scalars, &changes)?;
        }
        Ok(TrialIngestOutcome { trial_id: trial.id, nct_id: identity.nct_id, appended, change_count })
    }
}

/// Classifies a [`SqliteStoreError`] as retryable. Only `Db` is treated as
/// transient (a busy-timeout surfaces this way); corruption, invalid data,
/// and oversized payloads are permanent — retrying would not help.
fn is_transient_store_error(error: &TrialIngestError) -> bool {
    matches!(error, TrialIngestError::Store(SqliteStoreError::Db(_)))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use trial_config::ChangeDetectorConfig;
    use trial_core::RegistryPage;
    use trial_store_sqlite::SqliteStoreConfig;
    use trial_store_sqlite::SqliteStore;

    use super::IngestOrchestrator;
    use crate::cancellation::CancellationToken;

    struct StubRegistry {
        pages: Mutex<Vec<RegistryPage>>,
    }

    impl trial_core::RegistryClient for StubRegistry {
        fn fetch_page(&self, _page_token: Option<&str>) -> Result<RegistryPage, trial_core::RegistryError> {
            let mut pages = self.pages.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            Ok(pages.pop().unwrap_or(RegistryPage { records: Vec::new(), next_page_token: None }))
        }
    }

    fn sample_record(nct: &str) -> serde_json::Value {
        json!({
            "protocolSection": {
                "identificationModule": {"nctId": nct},
                "sponsorCollaboratorsModule": {"leadSponsor": {"name": "Acme Biotech"}},
            }
        })
    }

    #[test]
    fn ingests_a_single_page_and_reports_one_append() {
        let store = SqliteStore::open(SqliteStoreConfig::in_memory()).unwrap();
        let registry = StubRegistry {
            pages: Mutex::new(vec![RegistryPage { records: vec![sample_record("NCT00000001")], next_page_token: None }]),
        };
        let config = ChangeDetectorConfig::default();
        let orchestrator = IngestOrchestrator::new(&registry, &store, &config, CancellationToken::new());
        let report = orchestrator.run_batch().unwrap();
        assert_eq!(report.pages_fetched, 1);
        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].appended);
        assert_eq!(report.failures.len(), 0);
    }

    #[test]
    fn re_ingesting_the_same_record_does_not_append_again() {
        let store = SqliteStore::open(SqliteStoreConfig::in_memory()).unwrap();
        let record = sample_record("NCT00000002");
        let registry = StubRegistry {
            pages: Mutex::new(vec![RegistryPage { records: vec![record.clone()], next_page_token: None }]),
        };
        let config = ChangeDetectorConfig::default();
        let orchestrator = IngestOrchestrator::new(&registry, &store, &config, CancellationToken::new());
        orchestrator.run_batch().unwrap();
        *registry.pages.lock().unwrap() = vec![RegistryPage { records: vec![record], next_page_token: None }];
        let report = orchestrator.run_batch().unwrap();
        assert!(!report.outcomes[0].appended);
    }

    #[test]
    fn a_record_with_no_nct_id_is_reported_as_a_failure_not_an_abort() {
        let store = SqliteStore::open(SqliteStoreConfig::in_memory()).unwrap();
        let registry = StubRegistry {
            pages: Mutex::new(vec![RegistryPage {
                records: vec![json!({"protocolSection": {}}), sample_record("NCT00000003")],
                next_page_token: None,
            }]),
        };
        let config = ChangeDetectorConfig::default();
        let orchestrator = IngestOrchestrator::new(&registry, &store, &config, CancellationToken::new());
        let report = orchestrator.run_batch().unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.outcomes.len(), 1);
    }

    #[test]
    fn cancellation_before_the_first_page_stops_the_batch() {
        let store = SqliteStore::open(SqliteStoreConfig::in_memory()).unwrap();
        let registry = StubRegistry {
            pages: Mutex::new(vec![RegistryPage { records: vec![sample_record("NCT00000004")], next_page_token: None }]),
        };
        let config = ChangeDetectorConfig::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let orchestrator = IngestOrchestrator::new(&registry, &store, &config, cancel);
        let report = orchestrator.run_batch().unwrap();
        assert!(report.cancelled);
        assert_eq!(report.pages_fetched, 0);
    }
}
