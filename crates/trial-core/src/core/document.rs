// crates/trial-core/src/core/document.rs
// ============================================================================
// Module: Document Core
// Description: Ingested documents, extracted entities, links, and study cards.
// Purpose: Provide the typed document graph the linking heuristics and signal
//          engine read from.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A [`Document`] is deduplicated by the sha256 of its raw bytes and unique
//! on source URL (a repeat fetch of the same URL only bumps `last_seen_at`).
//! [`DocumentLink`] rows are candidate asset/trial cross-references produced
//! by heuristics HP-1..HP-4; they are never promoted to a cross-reference of
//! record until the auto-promotion gate clears them.

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::AssetId;
use crate::core::identifiers::DocumentId;
use crate::core::identifiers::TrialId;

/// The kind of document ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// A sponsor or wire-service press release.
    PressRelease,
    /// A conference abstract.
    Abstract,
    /// Any other ingested document.
    Other,
}

/// An ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Surrogate key.
    pub id: DocumentId,
    /// Canonical source URL; unique.
    pub source_url: String,
    /// sha256 of the raw bytes, used for dedup.
    pub content_sha256: String,
    /// MIME content type as supplied by the fetcher.
    pub content_type: String,
    /// The document kind, if classified.
    pub kind: DocumentKind,
    /// First time this content was ingested.
    pub first_seen_at: OffsetDateTime,
    /// Most recent time this URL was re-fetched.
    pub last_seen_at: OffsetDateTime,
}

/// An entity (asset code, INN, phase keyword, indication keyword, NCT-like
/// accession string) extracted from a document's text, with its byte span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEntity {
    /// Owning document.
    pub document_id: DocumentId,
    /// Entity kind (e.g. `"nct_like"`, `"asset_code"`, `"generic_name"`,
    /// `"phase_keyword"`, `"indication_keyword"`).
    pub kind: String,
    /// The matched text, verbatim.
    pub text: String,
    /// Start byte offset within the document's extracted text.
    pub start: usize,
    /// End byte offset (exclusive) within the document's extracted text.
    pub end: usize,
}

/// Which high-precision heuristic produced a [`DocumentLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkHeuristic {
    /// HP-1: NCT-like accession within 250 characters of an asset alias.
    NctNearAsset,
    /// HP-2: exact intervention-name match against a registry cache.
    ExactInterventionMatch,
    /// HP-3: company-hosted press release with code + INN co-occurrence.
    CompanyHostedCodeAndInn,
    /// HP-4: abstract with unambiguous code in the title and phase +
    /// indication keywords in the body.
    AbstractSpecificity,
}

impl LinkHeuristic {
    /// The heuristic's initial confidence before conflict/combo adjustment.
    #[must_use]
    pub const fn base_confidence(self) -> f64 {
        match self {
            Self::NctNearAsset => 1.00,
            Self::ExactInterventionMatch => 0.95,
            Self::CompanyHostedCodeAndInn => 0.90,
            Self::AbstractSpecificity => 0.85,
        }
    }
}

/// A candidate asset/trial cross-reference produced by a linking heuristic.
///
/// # Invariants
/// `confidence` starts at the producing heuristic's [`LinkHeuristic::base_confidence`]
/// and may be reduced by the conflict/combo downgrade; it is never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLink {
    /// Owning document.
    pub document_id: DocumentId,
    /// Candidate trial, when the heuristic anchors on a trial accession.
    pub trial_id: Option<TrialId>,
    /// Candidate asset.
    pub asset_id: AssetId,
    /// Producing heuristic.
    pub heuristic: LinkHeuristic,
    /// Final confidence after conflict/combo adjustment.
    pub confidence: f64,
    /// True once the auto-promotion gate has cleared this link.
    pub promoted: bool,
}

/// A structured study card extracted from a document, with evidence spans
/// for every numeric value it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyCard {
    /// Document this card was extracted from.
    pub document_id: DocumentId,
    /// Trial this card describes, once linked.
    pub trial_id: Option<TrialId>,
    /// Opaque extracted fields (endpoint readouts, effect sizes, p-values,
    /// enrollment figures), each paired with an evidence span id in
    /// `evidence_span_ids`.
    pub fields: serde_json::Value,
    /// Document-entity spans backing every numeric value in `fields`.
    pub evidence_span_ids: Vec<u64>,
}
