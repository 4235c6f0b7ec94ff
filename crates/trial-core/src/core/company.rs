// crates/trial-core/src/core/company.rs
// ============================================================================
// Module: Sponsor Graph
// Description: Company, asset, and asset-alias entities.
// Purpose: Provide the typed sponsor/asset graph the resolver and document
//          linker both reference.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Companies own assets; assets carry one or more aliases (generic name,
//! code name, brand name) that documents and sponsor text are matched
//! against. An alias is unique per `(asset_id, alias_norm, alias_type)`.

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AssetId;
use crate::core::identifiers::CompanyId;

/// A sponsor company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// Surrogate key.
    pub id: CompanyId,
    /// Canonical display name.
    pub name: String,
    /// Normalized name used for exact/fuzzy matching (lowercase, punctuation
    /// stripped, legal-entity suffixes removed).
    pub name_norm: String,
    /// Stock ticker symbol, when the company is publicly traded.
    pub ticker: Option<String>,
}

/// A drug or biologic asset owned by a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Surrogate key.
    pub id: AssetId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Canonical display name (typically the INN/generic name).
    pub name: String,
}

/// The kind of name a given [`AssetAlias`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetAliasType {
    /// International nonproprietary name / generic name.
    GenericName,
    /// Sponsor-internal development code name (e.g. `ABC-123`).
    CodeName,
    /// Commercial brand/trade name.
    BrandName,
}

/// An alias an asset is known by, unique per `(asset_id, alias_norm, alias_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAlias {
    /// Asset this alias names.
    pub asset_id: AssetId,
    /// The alias as written by its source.
    pub alias_text: String,
    /// Normalized form (lowercase, whitespace-collapsed) used for matching.
    pub alias_norm: String,
    /// The kind of alias this is.
    pub alias_type: AssetAliasType,
    /// Where this alias was sourced from (e.g. `"registry"`, `"document"`).
    pub source: String,
}
