// crates/trial-core/src/core/mod.rs
// ============================================================================
// Module: Trial Core Types
// Description: Canonical trial-intelligence schema and append-only records.
// Purpose: Provide stable, serializable types shared across every crate.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Trial core types define the registry-sourced entities (trials, versions),
//! the sponsor graph (companies, assets, aliases), the document graph
//! (documents, entities, links, study cards), the resolver's append-only
//! decision log, the signal/gate/posterior audit trail, and catalyst windows.
//! These types are the canonical source of truth for every derived surface
//! (store schema, engine outputs, CLI rendering).

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod catalyst;
pub mod company;
pub mod document;
pub mod hashing;
pub mod identifiers;
pub mod resolver;
pub mod score;
pub mod trial;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalyst::CatalystWindow;
pub use catalyst::SlipStats;
pub use catalyst::StudyHint;
pub use catalyst::StudyHintKind;
pub use company::Asset;
pub use company::AssetAlias;
pub use company::AssetAliasType;
pub use company::Company;
pub use document::Document;
pub use document::DocumentEntity;
pub use document::DocumentKind;
pub use document::DocumentLink;
pub use document::LinkHeuristic;
pub use document::StudyCard;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::AssetId;
pub use identifiers::CompanyId;
pub use identifiers::DocumentId;
pub use identifiers::NctId;
pub use identifiers::ReviewItemId;
pub use identifiers::RunId;
pub use identifiers::SignalId;
pub use identifiers::TrialId;
pub use resolver::ResolverDecisionMode;
pub use resolver::ResolverDecisionRecord;
pub use resolver::ResolverLabel;
pub use resolver::ResolverReviewItem;
pub use resolver::ReviewCandidate;
pub use score::EvidenceSpan;
pub use score::GateEvalRecord;
pub use score::ScoreResult;
pub use score::StopRuleHitRecord;
pub use trial::ChangeRecord;
pub use trial::ChangeSignificance;
pub use trial::ChangeType;
pub use trial::InterventionType;
pub use trial::Trial;
pub use trial::TrialPhase;
pub use trial::TrialStatus;
pub use trial::TrialVersion;
pub use trial::TrialVersionScalars;
