// system-tests/tests/resolver_review.rs
// ============================================================================
// Module: Resolver Review Queue Test
// Description: Exercises the review-queue round trip a human reviewer drives
//              through `trial-cli review list|accept|reject`.
// Purpose: Confirm `SqliteStore`'s `ResolverStore` impl assigns review-item
//          ids independently of the caller-supplied placeholder, lists
//          pending items oldest first, and clears them on resolution.
// Dependencies: trial-core, trial-store-sqlite
// ============================================================================

use std::collections::BTreeMap;
use std::num::NonZeroU64;

use time::OffsetDateTime;
use trial_core::NctId;
use trial_core::ResolverDecisionMode;
use trial_core::ResolverDecisionRecord;
use trial_core::ResolverReviewItem;
use trial_core::ResolverStore;
use trial_core::ReviewCandidate;
use trial_core::ReviewItemId;
use trial_core::RunId;
use trial_store_sqlite::SqliteStore;
use trial_store_sqlite::SqliteStoreConfig;

fn placeholder_review_item(nct_id: &str, sponsor_text: &str, company_id: trial_core::CompanyId) -> ResolverReviewItem {
    ResolverReviewItem {
        id: ReviewItemId::new(NonZeroU64::MIN),
        run_id: RunId::new("run-review"),
        nct_id: NctId::new(nct_id),
        sponsor_text: sponsor_text.to_string(),
        candidates: vec![ReviewCandidate { company_id, probability: 0.62, features: BTreeMap::new() }],
        created_at: OffsetDateTime::now_utc(),
        resolved: false,
    }
}

#[test]
fn queued_review_items_are_listed_then_cleared_on_accept() {
    let store = SqliteStore::open(SqliteStoreConfig::in_memory()).unwrap();
    let company = store.upsert_company("Acme Biotech", "acme biotech", None).unwrap();

    let item = placeholder_review_item("NCT01111111", "Acme Biotek", company.id);
    let review_id = store.write_review_item(&item).unwrap();

    let pending = store.list_pending_reviews(10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, review_id);
    assert_eq!(pending[0].candidates[0].company_id, company.id);

    let decision = ResolverDecisionRecord {
        run_id: RunId::new("run-review"),
        nct_id: item.nct_id,
        sponsor_text: item.sponsor_text,
        mode: ResolverDecisionMode::Accept,
        company_id: Some(company.id),
        probability: 0.62,
        top2_margin: 0.0,
        features: BTreeMap::new(),
        leader_meta: serde_json::Value::Null,
        decided_by: "human".to_string(),
        notes: Some("confirmed by analyst".to_string()),
        created_at: OffsetDateTime::now_utc(),
    };
    store.write_decision(&decision).unwrap();
    store.mark_review_resolved(review_id).unwrap();

    assert!(store.list_pending_reviews(10).unwrap().is_empty());
}

#[test]
fn rejecting_a_review_item_clears_it_without_a_decision() {
    let store = SqliteStore::open(SqliteStoreConfig::in_memory()).unwrap();
    let company = store.upsert_company("Globex Therapeutics", "globex therapeutics", None).unwrap();
    let item = placeholder_review_item("NCT02222222", "Globex Pharma Holdings", company.id);
    let review_id = store.write_review_item(&item).unwrap();

    store.mark_review_resolved(review_id).unwrap();

    assert!(store.list_pending_reviews(10).unwrap().is_empty());
}

#[test]
fn resolving_an_unknown_review_item_is_reported_as_an_error() {
    let store = SqliteStore::open(SqliteStoreConfig::in_memory()).unwrap();
    let unknown = ReviewItemId::new(NonZeroU64::new(999).unwrap());
    let result = store.mark_review_resolved(unknown);
    assert!(matches!(result, Err(trial_core::ResolverStoreError::UnknownReviewItem(id)) if id == unknown));
}
