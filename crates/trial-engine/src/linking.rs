// crates/trial-engine/src/linking.rs
// ============================================================================
// Module: Document Linking Heuristics
// Description: HP-1..HP-4 candidate asset/trial cross-reference detection,
//              conflict/combo downgrade, and the auto-promotion gate.
// Purpose: Turn extracted document entities into scored `DocumentLink`
//          candidates, never promoted without a calibrated precision check.
// Dependencies: trial-config, trial-core
// Grounded on: spec.md §4.5; original_source/ncfd/src/ncfd/mapping/linking_heuristics.py
// ============================================================================

//! ## Overview
//! Each `link_hpN` function inspects one document's extracted entities (and,
//! for HP-3/HP-4, its source host and kind) and returns zero or more
//! [`DocumentLink`] candidates at the heuristic's base confidence. HP-2 is
//! implemented but inert by default: it requires an external registry
//! intervention-name cache this schema does not carry, matching the already
//! disabled-by-default precedent for that collaborator (`spec.md` §4.5,
//! `DESIGN.md` Open Question 3).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use trial_config::LinkingConfig;
use trial_core::AssetAlias;
use trial_core::AssetId;
use trial_core::Document;
use trial_core::DocumentEntity;
use trial_core::DocumentId;
use trial_core::DocumentKind;
use trial_core::DocumentLink;
use trial_core::LinkHeuristic;

// ============================================================================
// SECTION: Alias Lookup
// ============================================================================

/// Resolves a normalized entity text to the asset it names, when any alias
/// matches exactly.
fn resolve_asset(aliases: &[AssetAlias], text_norm: &str) -> Option<AssetId> {
    aliases
        .iter()
        .find(|alias| alias.alias_norm == text_norm)
        .map(|alias| alias.asset_id)
}

fn normalize_entity_text(text: &str) -> String {
    text.trim().to_ascii_lowercase()
}

// ============================================================================
// SECTION: HP-1 — NCT Near Asset
// ============================================================================

/// An NCT-like accession string found near a resolvable asset alias.
#[derive(Debug, Clone, PartialEq)]
pub struct NctProximityHit {
    /// The candidate link, with `trial_id` left `None` (the caller resolves
    /// the accession text to a `TrialId`).
    pub link: DocumentLink,
    /// The matched NCT-like accession text.
    pub nct_text: String,
}

/// HP-1: an NCT-like accession string and an asset alias within
/// `proximity_chars` of each other in the same document.
#[must_use]
pub fn link_hp1(
    document_id: DocumentId,
    entities: &[DocumentEntity],
    aliases: &[AssetAlias],
    proximity_chars: usize,
) -> Vec<NctProximityHit> {
    let nct_entities: Vec<&DocumentEntity> = entities.iter().filter(|e| e.kind == "nct_like").collect();
    let mut hits = Vec::new();
    for entity in entities {
        if entity.kind == "nct_like" {
            continue;
        }
        let Some(asset_id) = resolve_asset(aliases, &normalize_entity_text(&entity.text)) else {
            continue;
        };
        for nct in &nct_entities {
            let distance = entity.start.abs_diff(nct.start).min(entity.end.abs_diff(nct.end));
            if distance > proximity_chars {
                continue;
            }
            hits.push(NctProximityHit {
                link: DocumentLink {
                    document_id,
                    trial_id: None,
                    asset_id,
                    heuristic: LinkHeuristic::NctNearAsset,
                    confidence: LinkHeuristic::NctNearAsset.base_confidence(),
                    promoted: false,
                },
                nct_text: nct.text.clone(),
            });
        }
    }
    hits
}

// ============================================================================
// SECTION: HP-2 — Exact Intervention Match (disabled by default)
// ============================================================================

/// An external cache mapping a normalized registry intervention name to the
/// asset it names. Absent by default; HP-2 is inert without one.
pub type RegistryInterventionCache = BTreeMap<String, AssetId>;

/// HP-2: an asset alias exactly equals a registry intervention name for some
/// known trial. Returns no candidates when `registry_cache` is `None`.
#[must_use]
pub fn link_hp2(
    document_id: DocumentId,
    entities: &[DocumentEntity],
    registry_cache: Option<&RegistryInterventionCache>,
) -> Vec<DocumentLink> {
    let Some(cache) = registry_cache else {
        return Vec::new();
    };
    entities
        .iter()
        .filter_map(|entity| {
            let asset_id = *cache.get(&normalize_entity_text(&entity.text))?;
            Some(DocumentLink {
                document_id,
                trial_id: None,
                asset_id,
                heuristic: LinkHeuristic::ExactInterventionMatch,
                confidence: LinkHeuristic::ExactInterventionMatch.base_confidence(),
                promoted: false,
            })
        })
        .collect()
}

// ============================================================================
// SECTION: HP-3 — Company-Hosted PR With Code+INN
// ============================================================================

/// HP-3: a press release hosted on a known company domain (not a configured
/// wire-service domain) that contains both an asset code and a generic name
/// resolving to the same asset.
#[must_use]
pub fn link_hp3(
    document: &Document,
    entities: &[DocumentEntity],
    aliases: &[AssetAlias],
    config: &LinkingConfig,
) -> Vec<DocumentLink> {
    if document.kind != DocumentKind::PressRelease {
        return Vec::new();
    }
    if is_wire_service_host(&document.source_url, &config.wire_service_domains) {
        return Vec::new();
    }
    let codes: Vec<AssetId> = entities
        .iter()
        .filter(|e| e.kind == "asset_code")
        .filter_map(|e| resolve_asset(aliases, &normalize_entity_text(&e.text)))
        .collect();
    let generics: Vec<AssetId> = entities
        .iter()
        .filter(|e| e.kind == "generic_name")
        .filter_map(|e| resolve_asset(aliases, &normalize_entity_text(&e.text)))
        .collect();
    codes
        .into_iter()
        .filter(|asset_id| generics.contains(asset_id))
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .map(|asset_id| DocumentLink {
            document_id: document.id,
            trial_id: None,
            asset_id,
            heuristic: LinkHeuristic::CompanyHostedCodeAndInn,
            confidence: LinkHeuristic::CompanyHostedCodeAndInn.base_confidence(),
            promoted: false,
        })
        .collect()
}

fn is_wire_service_host(source_url: &str, wire_service_domains: &[String]) -> bool {
    let host = source_url
        .split("://")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or(source_url)
        .to_ascii_lowercase();
    wire_service_domains
        .iter()
        .any(|domain| host == domain.to_ascii_lowercase() || host.ends_with(&format!(".{}", domain.to_ascii_lowercase())))
}

// ============================================================================
// SECTION: HP-4 — Abstract Specificity
// ============================================================================

/// HP-4: an abstract whose title names an unambiguous asset code, and whose
/// body contains a phase keyword and an indication keyword.
#[must_use]
pub fn link_hp4(
    document: &Document,
    title_entities: &[DocumentEntity],
    body_text: &str,
    aliases: &[AssetAlias],
    config: &LinkingConfig,
) -> Vec<DocumentLink> {
    if document.kind != DocumentKind::Abstract {
        return Vec::new();
    }
    let title_assets: Vec<AssetId> = title_entities
        .iter()
        .filter(|e| e.kind == "asset_code")
        .filter_map(|e| resolve_asset(aliases, &normalize_entity_text(&e.text)))
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    let [asset_id] = title_assets.as_slice() else {
        return Vec::new();
    };
    let body_lower = body_text.to_ascii_lowercase();
    let has_phase = config.phase_keywords.iter().any(|kw| body_lower.contains(kw.to_ascii_lowercase().as_str()));
    let has_indication = config.indication_keywords.iter().any(|kw| body_lower.contains(kw.to_ascii_lowercase().as_str()));
    if !(has_phase && has_indication) {
        return Vec::new();
    }
    vec![DocumentLink {
        document_id: document.id,
        trial_id: None,
        asset_id: *asset_id,
        heuristic: LinkHeuristic::AbstractSpecificity,
        confidence: LinkHeuristic::AbstractSpecificity.base_confidence(),
        promoted: false,
    }]
}

// ============================================================================
// SECTION: Conflict & Combo Downgrade
// ============================================================================

/// Downgrades every non-leading candidate's confidence by
/// `config.conflict_downgrade` when more than one asset is linked on the
/// same document and no combination wording is present. The leading
/// candidate (highest confidence, ties broken by heuristic precision order)
/// is left untouched.
#[must_use]
pub fn apply_conflict_downgrade(mut links: Vec<DocumentLink>, document_text: &str, config: &LinkingConfig) -> Vec<DocumentLink> {
    let distinct_assets: std::collections::BTreeSet<AssetId> = links.iter().map(|link| link.asset_id).collect();
    if distinct_assets.len() <= 1 || has_combo_wording(document_text) {
        return links;
    }
    let Some(leader_index) = links
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.confidence.total_cmp(&b.confidence))
        .map(|(index, _)| index)
    else {
        return links;
    };
    for (index, link) in links.iter_mut().enumerate() {
        if index != leader_index {
            link.confidence = (link.confidence - config.conflict_downgrade).max(0.0);
        }
    }
    links
}

fn has_combo_wording(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    ["combination", "combo", "plus", "+", "arm", "cohort"]
        .iter()
        .any(|word| lower.contains(*word))
}

// ============================================================================
// SECTION: Auto-Promotion Gate
// ============================================================================

/// One heuristic's reviewed-label calibration statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicCalibration {
    /// Number of reviewer-labeled links for this heuristic.
    pub labeled_count: u32,
    /// Observed precision on the labeled set.
    pub precision: f64,
}

/// Whether a heuristic's links may be auto-promoted to the cross-reference
/// tables of record, given the global flag and this heuristic's calibration.
#[must_use]
pub fn may_promote(config: &LinkingConfig, calibration: HeuristicCalibration) -> bool {
    config.promotion_enabled
        && calibration.labeled_count >= config.min_labeled_links
        && calibration.precision >= config.precision_threshold
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use trial_core::AssetAliasType;

    fn alias(asset_id: u64, text: &str) -> AssetAlias {
        AssetAlias {
            asset_id: AssetId::try_from(asset_id).unwrap(),
            alias_text: text.to_string(),
            alias_norm: text.to_ascii_lowercase(),
            alias_type: AssetAliasType::CodeName,
            source: "test".to_string(),
        }
    }

    fn entity(kind: &str, text: &str, start: usize, end: usize) -> DocumentEntity {
        DocumentEntity {
            document_id: DocumentId::try_from(1u64).unwrap(),
            kind: kind.to_string(),
            text: text.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn hp1_fires_within_proximity() {
        let aliases = vec![alias(1, "ABC-123")];
        let entities = vec![entity("nct_like", "NCT01234567", 0, 11), entity("asset_code", "ABC-123", 50, 57)];
        let hits = link_hp1(DocumentId::try_from(1u64).unwrap(), &entities, &aliases, 250);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].nct_text, "NCT01234567");
    }

    #[test]
    fn hp1_does_not_fire_outside_proximity() {
        let aliases = vec![alias(1, "ABC-123")];
        let entities = vec![entity("nct_like", "NCT01234567", 0, 11), entity("asset_code", "ABC-123", 1000, 1007)];
        let hits = link_hp1(DocumentId::try_from(1u64).unwrap(), &entities, &aliases, 250);
        assert!(hits.is_empty());
    }

    #[test]
    fn hp2_inert_without_cache() {
        let entities = vec![entity("intervention", "drug-x", 0, 6)];
        assert!(link_hp2(DocumentId::try_from(1u64).unwrap(), &entities, None).is_empty());
    }

    fn document(id: u64, url: &str, kind: DocumentKind) -> Document {
        Document {
            id: DocumentId::try_from(id).unwrap(),
            source_url: url.to_string(),
            content_sha256: "deadbeef".to_string(),
            content_type: "text/html".to_string(),
            kind,
            first_seen_at: OffsetDateTime::UNIX_EPOCH,
            last_seen_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn hp3_fires_on_company_hosted_code_and_inn() {
        let doc = document(1, "https://www.acmebio.com/news/trial-results", DocumentKind::PressRelease);
        let aliases = vec![alias(1, "ABC-123"), alias(1, "acmemab")];
        let entities = vec![entity("asset_code", "ABC-123", 0, 7), entity("generic_name", "acmemab", 20, 27)];
        let hits = link_hp3(&doc, &entities, &aliases, &LinkingConfig::default());
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn hp3_skips_wire_service_hosts() {
        let doc = document(1, "https://www.businesswire.com/news/trial-results", DocumentKind::PressRelease);
        let aliases = vec![alias(1, "ABC-123"), alias(1, "acmemab")];
        let entities = vec![entity("asset_code", "ABC-123", 0, 7), entity("generic_name", "acmemab", 20, 27)];
        assert!(link_hp3(&doc, &entities, &aliases, &LinkingConfig::default()).is_empty());
    }

    #[test]
    fn hp4_fires_on_specific_abstract() {
        let doc = document(1, "https://conference.example/abstracts/1", DocumentKind::Abstract);
        let aliases = vec![alias(1, "ABC-123")];
        let title = vec![entity("asset_code", "ABC-123", 0, 7)];
        let hits = link_hp4(&doc, &title, "Phase 3 trial in oncology patients", &aliases, &LinkingConfig::default());
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn conflict_downgrade_applies_to_non_leader() {
        let links = vec![
            DocumentLink {
                document_id: DocumentId::try_from(1u64).unwrap(),
                trial_id: None,
                asset_id: AssetId::try_from(1u64).unwrap(),
                heuristic: LinkHeuristic::NctNearAsset,
                confidence: 1.00,
                promoted: false,
            },
            DocumentLink {
                document_id: DocumentId::try_from(1u64).unwrap(),
                trial_id: None,
                asset_id: AssetId::try_from(2u64).unwrap(),
                heuristic: LinkHeuristic::CompanyHostedCodeAndInn,
                confidence: 0.90,
                promoted: false,
            },
        ];
        let config = LinkingConfig::default();
        let downgraded = apply_conflict_downgrade(links, "a study of two independent assets", &config);
        assert_eq!(downgraded[0].confidence, 1.00);
        assert!((downgraded[1].confidence - 0.70).abs() < 1e-9);
    }

    #[test]
    fn combo_wording_suppresses_downgrade() {
        let links = vec![
            DocumentLink {
                document_id: DocumentId::try_from(1u64).unwrap(),
                trial_id: None,
                asset_id: AssetId::try_from(1u64).unwrap(),
                heuristic: LinkHeuristic::NctNearAsset,
                confidence: 1.00,
                promoted: false,
            },
            DocumentLink {
                document_id: DocumentId::try_from(1u64).unwrap(),
                trial_id: None,
                asset_id: AssetId::try_from(2u64).unwrap(),
                heuristic: LinkHeuristic::CompanyHostedCodeAndInn,
                confidence: 0.90,
                promoted: false,
            },
        ];
        let config = LinkingConfig::default();
        let unchanged = apply_conflict_downgrade(links, "a combination of two assets", &config);
        assert_eq!(unchanged[1].confidence, 0.90);
    }

    #[test]
    fn promotion_requires_all_three_conditions() {
        let mut config = LinkingConfig::default();
        config.promotion_enabled = true;
        let good = HeuristicCalibration { labeled_count: 60, precision: 0.97 };
        assert!(may_promote(&config, good));
        let too_few = HeuristicCalibration { labeled_count: 10, precision: 0.99 };
        assert!(!may_promote(&config, too_few));
        config.promotion_enabled = false;
        assert!(!may_promote(&config, good));
    }
}
