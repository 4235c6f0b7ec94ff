// crates/trial-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Trial Store
// Description: Durable store for trials, the sponsor graph, documents, the
//              resolver's audit trail, scores, and catalyst windows.
// Purpose: Persist every named relation in the data model with deterministic
//          serialization and fail-closed reads.
// Dependencies: rusqlite, serde, serde_json, thiserror, time, trial-core
// ============================================================================

//! ## Overview
//! [`SqliteStore`] is the single persistence backend for the trial domain.
//! Writes are serialized through one connection guarded by a mutex; reads
//! are served from a small round-robin pool of read-only connections so
//! concurrent readers never block on the writer under WAL. Every per-trial
//! mutation that touches more than one table (e.g. recording a version and
//! its change set) runs inside a named `SAVEPOINT` so a partial failure
//! never leaves one trial's rows half-written.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use trial_core::Asset;
use trial_core::AssetAlias;
use trial_core::AssetAliasType;
use trial_core::AssetId;
use trial_core::CatalystWindow;
use trial_core::ChangeRecord;
use trial_core::Company;
use trial_core::CompanyId;
use trial_core::Document;
use trial_core::DocumentEntity;
use trial_core::DocumentId;
use trial_core::DocumentKind;
use trial_core::DocumentLink;
use trial_core::HashAlgorithm;
use trial_core::HashDigest;
use trial_core::LinkHeuristic;
use trial_core::NctId;
use trial_core::ResolverDecisionMode;
use trial_core::ResolverDecisionRecord;
use trial_core::ResolverLabel;
use trial_core::ResolverReviewItem;
use trial_core::ResolverStore;
use trial_core::ResolverStoreError;
use trial_core::ReviewCandidate;
use trial_core::ReviewItemId;
use trial_core::RunId;
use trial_core::ScoreResult;
use trial_core::ScoreStore;
use trial_core::ScoreStoreError;
use trial_core::StudyCard;
use trial_core::Trial;
use trial_core::TrialId;
use trial_core::TrialLookup;
use trial_core::TrialVersion;
use trial_core::TrialVersionScalars;
use trial_core::VersionStore;
use trial_core::VersionStoreError;
use trial_core::hashing::canonical_json_bytes;
use trial_core::hashing::hash_bytes;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
pub const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default read-connection pool size.
const DEFAULT_READ_POOL_SIZE: usize = 4;
/// Maximum raw trial-version payload size accepted by the store.
pub const MAX_STATE_BYTES: usize = 8 * 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` trial store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory), or `:memory:`.
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `read_pool_size` must be greater than zero.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file, or `:memory:`.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of read-only connections used for read path isolation.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl SqliteStoreConfig {
    /// Builds a config for an in-memory store, used by tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: 1,
        }
    }
}

/// Default busy timeout in milliseconds.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default read-connection pool size.
const fn default_read_pool_size() -> usize {
    DEFAULT_READ_POOL_SIZE
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or a row that fails its own invariants.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Store payload exceeded configured size limits.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

impl From<SqliteStoreError> for VersionStoreError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Backend(error.to_string())
    }
}

impl From<SqliteStoreError> for ResolverStoreError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Backend(error.to_string())
    }
}

impl From<SqliteStoreError> for ScoreStoreError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Backend(error.to_string())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed store for the trial-intelligence domain.
///
/// # Invariants
/// - `SQLite` write access is serialized through `write_connection`.
/// - Reads are served from `read_connections` in round-robin order.
#[derive(Clone)]
pub struct SqliteStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared writer connection guarded by a mutex.
    write_connection: Arc<Mutex<Connection>>,
    /// Read-only connections used for read path isolation under WAL.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
}

impl SqliteStore {
    /// Opens (creating if absent) a `SQLite` store at `config.path` and runs
    /// schema initialization.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the database cannot be opened or the
    /// schema cannot be initialized.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let mut write_connection = open_connection(&config)?;
        initialize_schema(&mut write_connection)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0..config.read_pool_size {
            read_connections.push(Mutex::new(open_read_connection(&config)?));
        }
        Ok(Self {
            config,
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Runs `f` against a read-only connection selected round-robin.
    fn with_read<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, SqliteStoreError> {
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % self.read_connections.len().max(1);
        let guard = self.read_connections[index]
            .lock()
            .map_err(|_| SqliteStoreError::Db("read connection mutex poisoned".to_string()))?;
        f(&guard).map_err(SqliteStoreError::from)
    }

    /// Runs `f` against the single writer connection.
    fn with_write<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self
            .write_connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("write connection mutex poisoned".to_string()))?;
        f(&mut guard).map_err(SqliteStoreError::from)
    }

    /// Runs `f` inside a named `SAVEPOINT`, committing on `Ok` and rolling
    /// back on `Err`. Used for multi-table per-trial mutations so a partial
    /// failure never leaves one trial's rows half-written.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the savepoint cannot be opened,
    /// released, or rolled back, or if `f` itself fails.
    fn with_trial_savepoint<T>(
        &self,
        name: &str,
        f: impl FnOnce(&rusqlite::Transaction) -> rusqlite::Result<T>,
    ) -> Result<T, SqliteStoreError> {
        self.with_write(|conn| {
            let tx = conn.savepoint_with_name(name)?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
    }

    // ------------------------------------------------------------------
    // Trial identity
    // ------------------------------------------------------------------

    /// Ensures a [`Trial`] row exists for `nct_id`, inserting one with
    /// `sponsor_text` if absent, and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn ensure_trial(&self, nct_id: &NctId, sponsor_text: &str) -> Result<Trial, SqliteStoreError> {
        self.with_write(|conn| {
            let existing = conn
                .query_row(
                    "SELECT id, nct_id, sponsor_text, first_seen_at FROM trials WHERE nct_id = ?1",
                    params![nct_id.as_str()],
                    row_to_trial,
                )
                .optional()?;
            if let Some(trial) = existing {
                return Ok(trial);
            }
            let now = now_rfc3339();
            conn.execute(
                "INSERT INTO trials (nct_id, sponsor_text, first_seen_at) VALUES (?1, ?2, ?3)",
                params![nct_id.as_str(), sponsor_text, now],
            )?;
            let id = conn.last_insert_rowid();
            Ok(Trial {
                id: TrialId::try_from(u64_from_rowid(id)).map_err(rusqlite_invalid)?,
                nct_id: nct_id.clone(),
                sponsor_text: sponsor_text.to_string(),
                first_seen_at: parse_rfc3339(&now).map_err(rusqlite_invalid)?,
            })
        })
    }

    /// Returns the trial with the given surrogate key, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn get_trial(&self, trial_id: TrialId) -> Result<Option<Trial>, SqliteStoreError> {
        self.with_read(|conn| {
            conn.query_row(
                "SELECT id, nct_id, sponsor_text, first_seen_at FROM trials WHERE id = ?1",
                params![i64_from(trial_id.get())],
                row_to_trial,
            )
            .optional()
        })
    }

    // ------------------------------------------------------------------
    // Sponsor graph
    // ------------------------------------------------------------------

    /// Inserts or updates a company row, keyed by `name_norm`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn upsert_company(&self, name: &str, name_norm: &str, ticker: Option<&str>) -> Result<Company, SqliteStoreError> {
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO companies (name, name_norm, ticker) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name_norm) DO UPDATE SET name = excluded.name, ticker = excluded.ticker",
                params![name, name_norm, ticker],
            )?;
            conn.query_row(
                "SELECT id, name, name_norm, ticker FROM companies WHERE name_norm = ?1",
                params![name_norm],
                row_to_company,
            )
        })
    }

    /// Returns a company by surrogate key, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn get_company(&self, company_id: CompanyId) -> Result<Option<Company>, SqliteStoreError> {
        self.with_read(|conn| {
            conn.query_row(
                "SELECT id, name, name_norm, ticker FROM companies WHERE id = ?1",
                params![i64_from(company_id.get())],
                row_to_company,
            )
            .optional()
        })
    }

    /// Returns every known company, ordered by surrogate key. The sponsor
    /// resolver needs the full company universe to score candidates against.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn list_companies(&self) -> Result<Vec<Company>, SqliteStoreError> {
        self.with_read(|conn| {
            let mut statement = conn.prepare("SELECT id, name, name_norm, ticker FROM companies ORDER BY id")?;
            let rows = statement.query_map([], row_to_company)?.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Inserts or updates an asset owned by `company_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn upsert_asset(&self, company_id: CompanyId, name: &str) -> Result<Asset, SqliteStoreError> {
        self.with_write(|conn| {
            let existing = conn
                .query_row(
                    "SELECT id, company_id, name FROM assets WHERE company_id = ?1 AND name = ?2",
                    params![i64_from(company_id.get()), name],
                    row_to_asset,
                )
                .optional()?;
            if let Some(asset) = existing {
                return Ok(asset);
            }
            conn.execute(
                "INSERT INTO assets (company_id, name) VALUES (?1, ?2)",
                params![i64_from(company_id.get()), name],
            )?;
            let id = conn.last_insert_rowid();
            Ok(Asset {
                id: AssetId::try_from(u64_from_rowid(id)).map_err(rusqlite_invalid)?,
                company_id,
                name: name.to_string(),
            })
        })
    }

    /// Inserts an asset alias, ignoring the write if it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn upsert_asset_alias(&self, alias: &AssetAlias) -> Result<(), SqliteStoreError> {
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO asset_aliases (asset_id, alias_text, alias_norm, alias_type, source)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(asset_id, alias_norm, alias_type) DO NOTHING",
                params![
                    i64_from(alias.asset_id.get()),
                    alias.alias_text,
                    alias.alias_norm,
                    alias_type_str(alias.alias_type),
                    alias.source,
                ],
            )?;
            Ok(())
        })
    }

    /// Returns every asset alias whose normalized form equals `alias_norm`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn find_aliases_by_norm(&self, alias_norm: &str) -> Result<Vec<AssetAlias>, SqliteStoreError> {
        self.with_read(|conn| {
            let mut statement = conn.prepare(
                "SELECT asset_id, alias_text, alias_norm, alias_type, source
                 FROM asset_aliases WHERE alias_norm = ?1",
            )?;
            let rows = statement
                .query_map(params![alias_norm], row_to_asset_alias)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// Inserts a new document, or bumps `last_seen_at` if `source_url`
    /// already exists.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn upsert_document(
        &self,
        source_url: &str,
        content_sha256: &str,
        content_type: &str,
        kind: DocumentKind,
    ) -> Result<Document, SqliteStoreError> {
        self.with_write(|conn| {
            let now = now_rfc3339();
            let existing = conn
                .query_row(
                    "SELECT id, source_url, content_sha256, content_type, kind, first_seen_at, last_seen_at
                     FROM documents WHERE source_url = ?1",
                    params![source_url],
                    row_to_document,
                )
                .optional()?;
            if existing.is_some() {
                conn.execute(
                    "UPDATE documents SET last_seen_at = ?2 WHERE source_url = ?1",
                    params![source_url, now],
                )?;
                return conn.query_row(
                    "SELECT id, source_url, content_sha256, content_type, kind, first_seen_at, last_seen_at
                     FROM documents WHERE source_url = ?1",
                    params![source_url],
                    row_to_document,
                );
            }
            conn.execute(
                "INSERT INTO documents
                    (source_url, content_sha256, content_type, kind, first_seen_at, last_seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![source_url, content_sha256, content_type, document_kind_str(kind), now],
            )?;
            let id = conn.last_insert_rowid();
            Ok(Document {
                id: DocumentId::try_from(u64_from_rowid(id)).map_err(rusqlite_invalid)?,
                source_url: source_url.to_string(),
                content_sha256: content_sha256.to_string(),
                content_type: content_type.to_string(),
                kind,
                first_seen_at: parse_rfc3339(&now).map_err(rusqlite_invalid)?,
                last_seen_at: parse_rfc3339(&now).map_err(rusqlite_invalid)?,
            })
        })
    }

    /// Inserts a document entity span, returning its assigned span id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn insert_document_entity(&self, entity: &DocumentEntity) -> Result<u64, SqliteStoreError> {
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO document_entities (document_id, kind, text, start_offset, end_offset)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    i64_from(entity.document_id.get()),
                    entity.kind,
                    entity.text,
                    i64_from_usize(entity.start),
                    i64_from_usize(entity.end),
                ],
            )?;
            Ok(u64_from_rowid(conn.last_insert_rowid()))
        })
    }

    /// Inserts or updates a candidate document link.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn upsert_document_link(&self, link: &DocumentLink) -> Result<(), SqliteStoreError> {
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO document_links
                    (document_id, trial_id, asset_id, heuristic, confidence, promoted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(document_id, asset_id, heuristic) DO UPDATE SET
                    trial_id = excluded.trial_id,
                    confidence = excluded.confidence,
                    promoted = excluded.promoted",
                params![
                    i64_from(link.document_id.get()),
                    link.trial_id.map(|id| i64_from(id.get())),
                    i64_from(link.asset_id.get()),
                    link_heuristic_str(link.heuristic),
                    link.confidence,
                    link.promoted,
                ],
            )?;
            Ok(())
        })
    }

    /// Returns every link recorded for `document_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn links_for_document(&self, document_id: DocumentId) -> Result<Vec<DocumentLink>, SqliteStoreError> {
        self.with_read(|conn| {
            let mut statement = conn.prepare(
                "SELECT document_id, trial_id, asset_id, heuristic, confidence, promoted
                 FROM document_links WHERE document_id = ?1",
            )?;
            let rows = statement
                .query_map(params![i64_from(document_id.get())], row_to_document_link)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Inserts or replaces the study card extracted from `card.document_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn upsert_study_card(&self, card: &StudyCard) -> Result<(), SqliteStoreError> {
        let fields_bytes = serde_json::to_vec(&card.fields).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        if fields_bytes.len() > MAX_STATE_BYTES {
            return Err(SqliteStoreError::TooLarge {
                max_bytes: MAX_STATE_BYTES,
                actual_bytes: fields_bytes.len(),
            });
        }
        let evidence_json = serde_json::to_string(&card.evidence_span_ids)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO study_cards (document_id, trial_id, fields_json, evidence_span_ids_json)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(document_id) DO UPDATE SET
                    trial_id = excluded.trial_id,
                    fields_json = excluded.fields_json,
                    evidence_span_ids_json = excluded.evidence_span_ids_json",
                params![
                    i64_from(card.document_id.get()),
                    card.trial_id.map(|id| i64_from(id.get())),
                    fields_bytes,
                    evidence_json,
                ],
            )?;
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Catalyst windows (recomputed on demand, not append-only)
    // ------------------------------------------------------------------

    /// Inserts or replaces the catalyst window for `window.trial_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn upsert_catalyst_window(&self, window: &CatalystWindow) -> Result<(), SqliteStoreError> {
        let sources_bytes =
            serde_json::to_vec(&window.sources).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let start = window.window_start.to_string();
        let end = window.window_end.to_string();
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO catalyst_windows
                    (trial_id, window_start, window_end, certainty, sources_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(trial_id) DO UPDATE SET
                    window_start = excluded.window_start,
                    window_end = excluded.window_end,
                    certainty = excluded.certainty,
                    sources_json = excluded.sources_json,
                    updated_at = excluded.updated_at",
                params![
                    i64_from(window.trial_id.get()),
                    start,
                    end,
                    window.certainty,
                    sources_bytes,
                    now_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Returns the most recently computed catalyst window for `trial_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn get_catalyst_window(&self, trial_id: TrialId) -> Result<Option<CatalystWindow>, SqliteStoreError> {
        self.with_read(|conn| {
            conn.query_row(
                "SELECT trial_id, window_start, window_end, certainty, sources_json
                 FROM catalyst_windows WHERE trial_id = ?1",
                params![i64_from(trial_id.get())],
                row_to_catalyst_window,
            )
            .optional()
        })
    }
}

// ============================================================================
// SECTION: VersionStore / TrialLookup
// ============================================================================

impl VersionStore for SqliteStore {
    fn record_version(
        &self,
        trial_id: TrialId,
        raw: serde_json::Value,
    ) -> Result<(TrialVersion, bool), VersionStoreError> {
        let canonical = canonical_json_bytes(&raw).map_err(|err| VersionStoreError::Backend(err.to_string()))?;
        if canonical.len() > MAX_STATE_BYTES {
            return Err(VersionStoreError::Backend(format!(
                "raw trial version exceeds size limit: {} bytes",
                canonical.len()
            )));
        }
        let digest = hash_bytes(HashAlgorithm::Sha256, &canonical);
        let scalars = TrialVersionScalars::default();
        self.with_trial_savepoint("record_trial_version", |tx| {
            let previous: Option<(String, Vec<u8>)> = tx
                .query_row(
                    "SELECT content_hash, scalars_json FROM trial_versions
                     WHERE trial_id = ?1 ORDER BY seq DESC LIMIT 1",
                    params![i64_from(trial_id.get())],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let unchanged = previous
                .as_ref()
                .is_some_and(|(prior_hash, _)| prior_hash == &digest.value);
            if unchanged {
                let version = tx.query_row(
                    "SELECT trial_id, captured_at, raw_json, content_hash, hash_algorithm,
                            scalars_json, changes_json
                     FROM trial_versions WHERE trial_id = ?1 ORDER BY seq DESC LIMIT 1",
                    params![i64_from(trial_id.get())],
                    row_to_trial_version,
                )?;
                return Ok((version, false));
            }
            let now = now_rfc3339();
            let scalars_json =
                serde_json::to_vec(&scalars).map_err(|err| rusqlite_invalid(err.to_string()))?;
            let changes: Vec<ChangeRecord> = Vec::new();
            let changes_json =
                serde_json::to_vec(&changes).map_err(|err| rusqlite_invalid(err.to_string()))?;
            let next_seq: i64 = tx.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM trial_versions WHERE trial_id = ?1",
                params![i64_from(trial_id.get())],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO trial_versions
                    (trial_id, seq, captured_at, raw_json, content_hash, hash_algorithm,
                     scalars_json, changes_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    i64_from(trial_id.get()),
                    next_seq,
                    now,
                    canonical,
                    digest.value,
                    hash_algorithm_str(digest.algorithm),
                    scalars_json,
                    changes_json,
                ],
            )?;
            Ok((
                TrialVersion {
                    trial_id,
                    captured_at: parse_rfc3339(&now).map_err(rusqlite_invalid)?,
                    raw,
                    content_hash: digest,
                    scalars,
                    changes,
                },
                true,
            ))
        })
        .map_err(VersionStoreError::from)
    }

    fn latest_version(&self, trial_id: TrialId) -> Result<Option<TrialVersion>, VersionStoreError> {
        self.with_read(|conn| {
            conn.query_row(
                "SELECT trial_id, captured_at, raw_json, content_hash, hash_algorithm,
                        scalars_json, changes_json
                 FROM trial_versions WHERE trial_id = ?1 ORDER BY seq DESC LIMIT 1",
                params![i64_from(trial_id.get())],
                row_to_trial_version,
            )
            .optional()
        })
        .map_err(VersionStoreError::from)
    }
}

impl SqliteStore {
    /// Overwrites the extracted scalars and change set recorded against the
    /// most recent version of `trial_id`.
    ///
    /// `record_version` has no way to accept these: its signature is fixed
    /// by [`VersionStore`], and the store has no dependency on the engine
    /// crate that computes them. The caller (the broker) normalizes the raw
    /// bag and detects changes against the prior version, then writes the
    /// result back onto the row `record_version` just appended.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on storage failure.
    pub fn record_version_scalars(
        &self,
        trial_id: TrialId,
        scalars: &TrialVersionScalars,
        changes: &[ChangeRecord],
    ) -> Result<(), SqliteStoreError> {
        let scalars_json = serde_json::to_vec(scalars).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let changes_json = serde_json::to_vec(changes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        self.with_trial_savepoint("record_version_scalars", |tx| {
            tx.execute(
                "UPDATE trial_versions SET scalars_json = ?1, changes_json = ?2
                 WHERE trial_id = ?3 AND seq = (SELECT MAX(seq) FROM trial_versions WHERE trial_id = ?3)",
                params![scalars_json, changes_json, i64_from(trial_id.get())],
            )?;
            Ok(())
        })
    }
}

impl TrialLookup for SqliteStore {
    fn nct_id_for(&self, trial_id: TrialId) -> Result<Option<NctId>, VersionStoreError> {
        self.with_read(|conn| {
            conn.query_row(
                "SELECT nct_id FROM trials WHERE id = ?1",
                params![i64_from(trial_id.get())],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
        .map(|opt| opt.map(NctId::new))
        .map_err(VersionStoreError::from)
    }
}

// ============================================================================
// SECTION: ResolverStore
// ============================================================================

impl ResolverStore for SqliteStore {
    fn write_decision(&self, decision: &ResolverDecisionRecord) -> Result<(), ResolverStoreError> {
        if decision.mode == ResolverDecisionMode::Accept && decision.company_id.is_none() {
            return Err(ResolverStoreError::Backend(
                "accept decisions require company_id".to_string(),
            ));
        }
        let features_json = serde_json::to_string(&decision.features)
            .map_err(|err| ResolverStoreError::Backend(err.to_string()))?;
        let leader_meta = serde_json::to_vec(&decision.leader_meta)
            .map_err(|err| ResolverStoreError::Backend(err.to_string()))?;
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO resolver_decisions
                    (run_id, nct_id, sponsor_text, mode, company_id, probability, top2_margin,
                     features_json, leader_meta_json, decided_by, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    decision.run_id.as_str(),
                    decision.nct_id.as_str(),
                    decision.sponsor_text,
                    resolver_mode_str(decision.mode),
                    decision.company_id.map(|id| i64_from(id.get())),
                    decision.probability,
                    decision.top2_margin,
                    features_json,
                    leader_meta,
                    decision.decided_by,
                    decision.notes,
                    format_offset_date_time(decision.created_at).map_err(rusqlite_invalid)?,
                ],
            )?;
            Ok(())
        })
        .map_err(ResolverStoreError::from)
    }

    fn write_review_item(&self, item: &ResolverReviewItem) -> Result<ReviewItemId, ResolverStoreError> {
        let candidates_json =
            serde_json::to_vec(&item.candidates).map_err(|err| ResolverStoreError::Backend(err.to_string()))?;
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO resolver_review_items
                    (run_id, nct_id, sponsor_text, candidates_json, created_at, resolved)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![
                    item.run_id.as_str(),
                    item.nct_id.as_str(),
                    item.sponsor_text,
                    candidates_json,
                    format_offset_date_time(item.created_at).map_err(rusqlite_invalid)?,
                ],
            )?;
            Ok(ReviewItemId::try_from(u64_from_rowid(conn.last_insert_rowid()))
                .map_err(rusqlite_invalid)?)
        })
        .map_err(ResolverStoreError::from)
    }

    fn list_pending_reviews(&self, limit: usize) -> Result<Vec<ResolverReviewItem>, ResolverStoreError> {
        self.with_read(|conn| {
            let mut statement = conn.prepare(
                "SELECT id, run_id, nct_id, sponsor_text, candidates_json, created_at, resolved
                 FROM resolver_review_items WHERE resolved = 0
                 ORDER BY created_at ASC LIMIT ?1",
            )?;
            let rows = statement
                .query_map(params![i64_from_usize(limit)], row_to_review_item)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .map_err(ResolverStoreError::from)
    }

    fn mark_review_resolved(&self, id: ReviewItemId) -> Result<(), ResolverStoreError> {
        let changed = self
            .with_write(|conn| {
                conn.execute(
                    "UPDATE resolver_review_items SET resolved = 1 WHERE id = ?1",
                    params![i64_from(id.get())],
                )
            })
            .map_err(ResolverStoreError::from)?;
        if changed == 0 {
            return Err(ResolverStoreError::UnknownReviewItem(id));
        }
        Ok(())
    }

    fn write_label(&self, label: &ResolverLabel) -> Result<(), ResolverStoreError> {
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO resolver_labels (nct_id, sponsor_text_norm, company_id, is_match, source)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(nct_id, sponsor_text_norm, company_id, source) DO UPDATE SET
                    is_match = excluded.is_match",
                params![
                    label.nct_id.as_str(),
                    label.sponsor_text_norm,
                    i64_from(label.company_id.get()),
                    label.is_match,
                    label.source,
                ],
            )?;
            Ok(())
        })
        .map_err(ResolverStoreError::from)
    }
}

// ============================================================================
// SECTION: ScoreStore
// ============================================================================

impl ScoreStore for SqliteStore {
    fn write_score(&self, score: &ScoreResult) -> Result<(), ScoreStoreError> {
        let gate_evals = serde_json::to_vec(&score.gate_evals).map_err(|err| ScoreStoreError::Backend(err.to_string()))?;
        let stop_rules =
            serde_json::to_vec(&score.stop_rules_applied).map_err(|err| ScoreStoreError::Backend(err.to_string()))?;
        let evidence_spans =
            serde_json::to_vec(&score.evidence_spans).map_err(|err| ScoreStoreError::Backend(err.to_string()))?;
        let existing = self
            .with_read(|conn| {
                conn.query_row(
                    "SELECT 1 FROM scores WHERE trial_id = ?1 AND run_id = ?2",
                    params![i64_from(score.trial_id.get()), score.run_id.as_str()],
                    |_| Ok(()),
                )
                .optional()
            })
            .map_err(ScoreStoreError::from)?;
        if existing.is_some() {
            return Err(ScoreStoreError::DuplicateScore {
                trial_id: score.trial_id,
                run_id: score.run_id.clone(),
            });
        }
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO scores
                    (trial_id, run_id, prior, logit_prior, sum_log_lr, logit_post, p_fail,
                     gate_evals_json, stop_rules_json, evidence_spans_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    i64_from(score.trial_id.get()),
                    score.run_id.as_str(),
                    score.prior,
                    score.logit_prior,
                    score.sum_log_lr,
                    score.logit_post,
                    score.p_fail,
                    gate_evals,
                    stop_rules,
                    evidence_spans,
                    format_offset_date_time(score.created_at).map_err(rusqlite_invalid)?,
                ],
            )?;
            Ok(())
        })
        .map_err(ScoreStoreError::from)
    }

    fn latest_score(&self, trial_id: TrialId) -> Result<Option<ScoreResult>, ScoreStoreError> {
        self.with_read(|conn| {
            conn.query_row(
                "SELECT trial_id, run_id, prior, logit_prior, sum_log_lr, logit_post, p_fail,
                        gate_evals_json, stop_rules_json, evidence_spans_json, created_at
                 FROM scores WHERE trial_id = ?1 ORDER BY created_at DESC LIMIT 1",
                params![i64_from(trial_id.get())],
                row_to_score_result,
            )
            .optional()
        })
        .map_err(ScoreStoreError::from)
    }
}

// ============================================================================
// SECTION: Connection / Schema Setup
// ============================================================================

/// Opens the writer connection and applies pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Opens a read-only connection for the read pool.
fn open_read_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    if config.path.as_os_str() == ":memory:" {
        // An in-memory database has no file to reopen as read-only; share the
        // single-connection behavior used by tests.
        return open_connection(config);
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    connection.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
    Ok(connection)
}

/// Applies the configured journal mode, sync mode, and busy timeout.
fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection.execute_batch(&format!(
        "PRAGMA journal_mode = {};",
        config.journal_mode.pragma_value()
    ))?;
    connection.execute_batch(&format!(
        "PRAGMA synchronous = {};",
        config.sync_mode.pragma_value()
    ))?;
    connection.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing `user_version`.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    let version: i64 = tx.query_row("PRAGMA user_version", params![], |row| row.get(0))?;
    if version == 0 {
        tx.execute_batch(SCHEMA_DDL)?;
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    } else if version != SCHEMA_VERSION {
        return Err(SqliteStoreError::Corrupt(format!(
            "unsupported schema version {version}, expected {SCHEMA_VERSION}"
        )));
    }
    tx.commit()?;
    Ok(())
}

const SCHEMA_DDL: &str = "
CREATE TABLE trials (
    id INTEGER PRIMARY KEY,
    nct_id TEXT NOT NULL UNIQUE,
    sponsor_text TEXT NOT NULL,
    first_seen_at TEXT NOT NULL
);
CREATE TABLE trial_versions (
    trial_id INTEGER NOT NULL REFERENCES trials(id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    captured_at TEXT NOT NULL,
    raw_json BLOB NOT NULL,
    content_hash TEXT NOT NULL,
    hash_algorithm TEXT NOT NULL,
    scalars_json BLOB NOT NULL,
    changes_json BLOB NOT NULL,
    PRIMARY KEY (trial_id, seq)
);
CREATE TABLE companies (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    name_norm TEXT NOT NULL UNIQUE,
    ticker TEXT
);
CREATE TABLE assets (
    id INTEGER PRIMARY KEY,
    company_id INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    name TEXT NOT NULL
);
CREATE TABLE asset_aliases (
    asset_id INTEGER NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
    alias_text TEXT NOT NULL,
    alias_norm TEXT NOT NULL,
    alias_type TEXT NOT NULL,
    source TEXT NOT NULL,
    PRIMARY KEY (asset_id, alias_norm, alias_type)
);
CREATE INDEX idx_asset_aliases_norm ON asset_aliases (alias_norm);
CREATE TABLE documents (
    id INTEGER PRIMARY KEY,
    source_url TEXT NOT NULL UNIQUE,
    content_sha256 TEXT NOT NULL,
    content_type TEXT NOT NULL,
    kind TEXT NOT NULL,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL
);
CREATE TABLE document_entities (
    id INTEGER PRIMARY KEY,
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    text TEXT NOT NULL,
    start_offset INTEGER NOT NULL,
    end_offset INTEGER NOT NULL
);
CREATE TABLE document_links (
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    trial_id INTEGER REFERENCES trials(id) ON DELETE SET NULL,
    asset_id INTEGER NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
    heuristic TEXT NOT NULL,
    confidence REAL NOT NULL,
    promoted INTEGER NOT NULL,
    PRIMARY KEY (document_id, asset_id, heuristic)
);
CREATE TABLE study_cards (
    document_id INTEGER PRIMARY KEY REFERENCES documents(id) ON DELETE CASCADE,
    trial_id INTEGER REFERENCES trials(id) ON DELETE SET NULL,
    fields_json BLOB NOT NULL,
    evidence_span_ids_json TEXT NOT NULL
);
CREATE TABLE resolver_decisions (
    run_id TEXT NOT NULL,
    nct_id TEXT NOT NULL,
    sponsor_text TEXT NOT NULL,
    mode TEXT NOT NULL,
    company_id INTEGER REFERENCES companies(id) ON DELETE SET NULL,
    probability REAL NOT NULL,
    top2_margin REAL NOT NULL,
    features_json TEXT NOT NULL,
    leader_meta_json BLOB NOT NULL,
    decided_by TEXT NOT NULL,
    notes TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (run_id, nct_id)
);
CREATE TABLE resolver_review_items (
    id INTEGER PRIMARY KEY,
    run_id TEXT NOT NULL,
    nct_id TEXT NOT NULL,
    sponsor_text TEXT NOT NULL,
    candidates_json BLOB NOT NULL,
    created_at TEXT NOT NULL,
    resolved INTEGER NOT NULL
);
CREATE INDEX idx_resolver_review_items_pending ON resolver_review_items (resolved, created_at);
CREATE TABLE resolver_labels (
    nct_id TEXT NOT NULL,
    sponsor_text_norm TEXT NOT NULL,
    company_id INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    is_match INTEGER NOT NULL,
    source TEXT NOT NULL,
    PRIMARY KEY (nct_id, sponsor_text_norm, company_id, source)
);
CREATE TABLE scores (
    trial_id INTEGER NOT NULL REFERENCES trials(id) ON DELETE CASCADE,
    run_id TEXT NOT NULL,
    prior REAL NOT NULL,
    logit_prior REAL NOT NULL,
    sum_log_lr REAL NOT NULL,
    logit_post REAL NOT NULL,
    p_fail REAL NOT NULL,
    gate_evals_json BLOB NOT NULL,
    stop_rules_json BLOB NOT NULL,
    evidence_spans_json BLOB NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (trial_id, run_id)
);
CREATE TABLE catalyst_windows (
    trial_id INTEGER PRIMARY KEY REFERENCES trials(id) ON DELETE CASCADE,
    window_start TEXT NOT NULL,
    window_end TEXT NOT NULL,
    certainty REAL NOT NULL,
    sources_json BLOB NOT NULL,
    updated_at TEXT NOT NULL
);
";

// ============================================================================
// SECTION: Row Mapping Helpers
// ============================================================================

/// Maps a `trials` row to a [`Trial`].
fn row_to_trial(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trial> {
    let id: i64 = row.get(0)?;
    let nct_id: String = row.get(1)?;
    let sponsor_text: String = row.get(2)?;
    let first_seen_at: String = row.get(3)?;
    Ok(Trial {
        id: TrialId::try_from(u64_from_rowid(id)).map_err(rusqlite_invalid)?,
        nct_id: NctId::new(nct_id),
        sponsor_text,
        first_seen_at: parse_rfc3339(&first_seen_at).map_err(rusqlite_invalid)?,
    })
}

/// Maps a `companies` row to a [`Company`].
fn row_to_company(row: &rusqlite::Row<'_>) -> rusqlite::Result<Company> {
    let id: i64 = row.get(0)?;
    Ok(Company {
        id: CompanyId::try_from(u64_from_rowid(id)).map_err(rusqlite_invalid)?,
        name: row.get(1)?,
        name_norm: row.get(2)?,
        ticker: row.get(3)?,
    })
}

/// Maps an `assets` row to an [`Asset`].
fn row_to_asset(row: &rusqlite::Row<'_>) -> rusqlite::Result<Asset> {
    let id: i64 = row.get(0)?;
    let company_id: i64 = row.get(1)?;
    Ok(Asset {
        id: AssetId::try_from(u64_from_rowid(id)).map_err(rusqlite_invalid)?,
        company_id: CompanyId::try_from(u64_from_rowid(company_id)).map_err(rusqlite_invalid)?,
        name: row.get(2)?,
    })
}

/// Maps an `asset_aliases` row to an [`AssetAlias`].
fn row_to_asset_alias(row: &rusqlite::Row<'_>) -> rusqlite::Result<AssetAlias> {
    let asset_id: i64 = row.get(0)?;
    let alias_type: String = row.get(3)?;
    Ok(AssetAlias {
        asset_id: AssetId::try_from(u64_from_rowid(asset_id)).map_err(rusqlite_invalid)?,
        alias_text: row.get(1)?,
        alias_norm: row.get(2)?,
        alias_type: parse_alias_type(&alias_type).map_err(rusqlite_invalid)?,
        source: row.get(4)?,
    })
}

/// Maps a `documents` row to a [`Document`].
fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let id: i64 = row.get(0)?;
    let kind: String = row.get(4)?;
    let first_seen_at: String = row.get(5)?;
    let last_seen_at: String = row.get(6)?;
    Ok(Document {
        id: DocumentId::try_from(u64_from_rowid(id)).map_err(rusqlite_invalid)?,
        source_url: row.get(1)?,
        content_sha256: row.get(2)?,
        content_type: row.get(3)?,
        kind: parse_document_kind(&kind).map_err(rusqlite_invalid)?,
        first_seen_at: parse_rfc3339(&first_seen_at).map_err(rusqlite_invalid)?,
        last_seen_at: parse_rfc3339(&last_seen_at).map_err(rusqlite_invalid)?,
    })
}

/// Maps a `document_links` row to a [`DocumentLink`].
fn row_to_document_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentLink> {
    let document_id: i64 = row.get(0)?;
    let trial_id: Option<i64> = row.get(1)?;
    let asset_id: i64 = row.get(2)?;
    let heuristic: String = row.get(3)?;
    Ok(DocumentLink {
        document_id: DocumentId::try_from(u64_from_rowid(document_id)).map_err(rusqlite_invalid)?,
        trial_id: trial_id
            .map(|id| TrialId::try_from(u64_from_rowid(id)))
            .transpose()
            .map_err(rusqlite_invalid)?,
        asset_id: AssetId::try_from(u64_from_rowid(asset_id)).map_err(rusqlite_invalid)?,
        heuristic: parse_link_heuristic(&heuristic).map_err(rusqlite_invalid)?,
        confidence: row.get(4)?,
        promoted: row.get(5)?,
    })
}

/// Maps a `trial_versions` row to a [`TrialVersion`].
fn row_to_trial_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrialVersion> {
    let trial_id: i64 = row.get(0)?;
    let captured_at: String = row.get(1)?;
    let raw_bytes: Vec<u8> = row.get(2)?;
    let content_hash: String = row.get(3)?;
    let hash_algorithm: String = row.get(4)?;
    let scalars_bytes: Vec<u8> = row.get(5)?;
    let changes_bytes: Vec<u8> = row.get(6)?;
    Ok(TrialVersion {
        trial_id: TrialId::try_from(u64_from_rowid(trial_id)).map_err(rusqlite_invalid)?,
        captured_at: parse_rfc3339(&captured_at).map_err(rusqlite_invalid)?,
        raw: serde_json::from_slice(&raw_bytes).map_err(|err| rusqlite_invalid(err.to_string()))?,
        content_hash: HashDigest {
            algorithm: parse_hash_algorithm(&hash_algorithm).map_err(rusqlite_invalid)?,
            value: content_hash,
        },
        scalars: serde_json::from_slice(&scalars_bytes).map_err(|err| rusqlite_invalid(err.to_string()))?,
        changes: serde_json::from_slice(&changes_bytes).map_err(|err| rusqlite_invalid(err.to_string()))?,
    })
}

/// Maps a `resolver_review_items` row to a [`ResolverReviewItem`].
fn row_to_review_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResolverReviewItem> {
    let id: i64 = row.get(0)?;
    let run_id: String = row.get(1)?;
    let nct_id: String = row.get(2)?;
    let sponsor_text: String = row.get(3)?;
    let candidates_bytes: Vec<u8> = row.get(4)?;
    let created_at: String = row.get(5)?;
    let resolved: bool = row.get(6)?;
    let candidates: Vec<ReviewCandidate> =
        serde_json::from_slice(&candidates_bytes).map_err(|err| rusqlite_invalid(err.to_string()))?;
    Ok(ResolverReviewItem {
        id: ReviewItemId::try_from(u64_from_rowid(id)).map_err(rusqlite_invalid)?,
        run_id: RunId::new(run_id),
        nct_id: NctId::new(nct_id),
        sponsor_text,
        candidates,
        created_at: parse_rfc3339(&created_at).map_err(rusqlite_invalid)?,
        resolved,
    })
}

/// Maps a `scores` row to a [`ScoreResult`].
fn row_to_score_result(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScoreResult> {
    let trial_id: i64 = row.get(0)?;
    let run_id: String = row.get(1)?;
    let gate_evals_bytes: Vec<u8> = row.get(7)?;
    let stop_rules_bytes: Vec<u8> = row.get(8)?;
    let evidence_bytes: Vec<u8> = row.get(9)?;
    let created_at: String = row.get(10)?;
    Ok(ScoreResult {
        trial_id: TrialId::try_from(u64_from_rowid(trial_id)).map_err(rusqlite_invalid)?,
        run_id: RunId::new(run_id),
        prior: row.get(2)?,
        logit_prior: row.get(3)?,
        sum_log_lr: row.get(4)?,
        logit_post: row.get(5)?,
        p_fail: row.get(6)?,
        gate_evals: serde_json::from_slice(&gate_evals_bytes).map_err(|err| rusqlite_invalid(err.to_string()))?,
        stop_rules_applied: serde_json::from_slice(&stop_rules_bytes)
            .map_err(|err| rusqlite_invalid(err.to_string()))?,
        evidence_spans: serde_json::from_slice(&evidence_bytes).map_err(|err| rusqlite_invalid(err.to_string()))?,
        created_at: parse_rfc3339(&created_at).map_err(rusqlite_invalid)?,
    })
}

/// Maps a `catalyst_windows` row to a [`CatalystWindow`].
fn row_to_catalyst_window(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalystWindow> {
    let trial_id: i64 = row.get(0)?;
    let window_start: String = row.get(1)?;
    let window_end: String = row.get(2)?;
    let sources_bytes: Vec<u8> = row.get(4)?;
    Ok(CatalystWindow {
        trial_id: TrialId::try_from(u64_from_rowid(trial_id)).map_err(rusqlite_invalid)?,
        window_start: time::Date::parse(&window_start, &time::format_description::well_known::Iso8601::DATE)
            .map_err(|err| rusqlite_invalid(err.to_string()))?,
        window_end: time::Date::parse(&window_end, &time::format_description::well_known::Iso8601::DATE)
            .map_err(|err| rusqlite_invalid(err.to_string()))?,
        certainty: row.get(3)?,
        sources: serde_json::from_slice(&sources_bytes).map_err(|err| rusqlite_invalid(err.to_string()))?,
    })
}

// ============================================================================
// SECTION: Small Conversion Helpers
// ============================================================================

/// Renders an [`AssetAliasType`] as its stored text form.
fn alias_type_str(alias_type: AssetAliasType) -> &'static str {
    match alias_type {
        AssetAliasType::GenericName => "generic_name",
        AssetAliasType::CodeName => "code_name",
        AssetAliasType::BrandName => "brand_name",
    }
}

/// Parses an [`AssetAliasType`] from its stored text form.
fn parse_alias_type(text: &str) -> Result<AssetAliasType, String> {
    match text {
        "generic_name" => Ok(AssetAliasType::GenericName),
        "code_name" => Ok(AssetAliasType::CodeName),
        "brand_name" => Ok(AssetAliasType::BrandName),
        other => Err(format!("unknown alias_type: {other}")),
    }
}

/// Renders a [`DocumentKind`] as its stored text form.
fn document_kind_str(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::PressRelease => "press_release",
        DocumentKind::Abstract => "abstract",
        DocumentKind::Other => "other",
    }
}

/// Parses a [`DocumentKind`] from its stored text form.
fn parse_document_kind(text: &str) -> Result<DocumentKind, String> {
    match text {
        "press_release" => Ok(DocumentKind::PressRelease),
        "abstract" => Ok(DocumentKind::Abstract),
        "other" => Ok(DocumentKind::Other),
        other => Err(format!("unknown document kind: {other}")),
    }
}

/// Renders a [`LinkHeuristic`] as its stored text form.
fn link_heuristic_str(heuristic: LinkHeuristic) -> &'static str {
    match heuristic {
        LinkHeuristic::NctNearAsset => "nct_near_asset",
        LinkHeuristic::ExactInterventionMatch => "exact_intervention_match",
        LinkHeuristic::CompanyHostedCodeAndInn => "company_hosted_code_and_inn",
        LinkHeuristic::AbstractSpecificity => "abstract_specificity",
    }
}

/// Parses a [`LinkHeuristic`] from its stored text form.
fn parse_link_heuristic(text: &str) -> Result<LinkHeuristic, String> {
    match text {
        "nct_near_asset" => Ok(LinkHeuristic::NctNearAsset),
        "exact_intervention_match" => Ok(LinkHeuristic::ExactInterventionMatch),
        "company_hosted_code_and_inn" => Ok(LinkHeuristic::CompanyHostedCodeAndInn),
        "abstract_specificity" => Ok(LinkHeuristic::AbstractSpecificity),
        other => Err(format!("unknown link heuristic: {other}")),
    }
}

/// Renders a [`ResolverDecisionMode`] as its stored text form.
fn resolver_mode_str(mode: ResolverDecisionMode) -> &'static str {
    match mode {
        ResolverDecisionMode::Accept => "accept",
        ResolverDecisionMode::Review => "review",
        ResolverDecisionMode::Reject => "reject",
    }
}

/// Renders a [`HashAlgorithm`] as its stored text form.
fn hash_algorithm_str(algorithm: HashAlgorithm) -> &'static str {
    match algorithm {
        HashAlgorithm::Sha256 => "sha256",
    }
}

/// Parses a [`HashAlgorithm`] from its stored text form.
fn parse_hash_algorithm(text: &str) -> Result<HashAlgorithm, String> {
    match text {
        "sha256" => Ok(HashAlgorithm::Sha256),
        other => Err(format!("unknown hash algorithm: {other}")),
    }
}

/// Returns the current time formatted as RFC 3339.
fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Formats a timestamp as RFC 3339.
fn format_offset_date_time(value: OffsetDateTime) -> Result<String, String> {
    value.format(&Rfc3339).map_err(|err| err.to_string())
}

/// Parses an RFC 3339 timestamp.
fn parse_rfc3339(text: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(text, &Rfc3339).map_err(|err| err.to_string())
}

/// Wraps a conversion failure as a `rusqlite::Error` for use inside row
/// mapping closures.
fn rusqlite_invalid(message: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(0, message.to_string(), rusqlite::types::Type::Text)
}

/// Converts a `SQLite` rowid to `u64`.
fn u64_from_rowid(id: i64) -> u64 {
    // SQLite rowids are always non-negative for our auto-increment usage.
    u64::try_from(id).unwrap_or(1)
}

#[allow(
    clippy::cast_possible_wrap,
    reason = "surrogate keys are small enough that u64 -> i64 never wraps in practice"
)]
/// Converts a `u64` surrogate key to `i64` for parameter binding.
fn i64_from(value: u64) -> i64 {
    value as i64
}

#[allow(
    clippy::cast_possible_wrap,
    reason = "byte offsets and limits fit comfortably within i64 range"
)]
/// Converts a `usize` length or offset to `i64` for parameter binding.
fn i64_from_usize(value: usize) -> i64 {
    value as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use trial_core::ResolverDecisionMode;

    fn open_test_store() -> SqliteStore {
        SqliteStore::open(SqliteStoreConfig::in_memory()).unwrap()
    }

    #[test]
    fn ensure_trial_is_idempotent() {
        let store = open_test_store();
        let nct_id = NctId::new("NCT00000001");
        let first = store.ensure_trial(&nct_id, "Acme Pharma").unwrap();
        let second = store.ensure_trial(&nct_id, "Acme Pharma").unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn record_version_detects_unchanged_content() {
        let store = open_test_store();
        let nct_id = NctId::new("NCT00000002");
        let trial = store.ensure_trial(&nct_id, "Acme Pharma").unwrap();
        let raw = serde_json::json!({"phase": "PHASE3"});
        let (_, appended_first) = store.record_version(trial.id, raw.clone()).unwrap();
        let (_, appended_second) = store.record_version(trial.id, raw).unwrap();
        assert!(appended_first);
        assert!(!appended_second);
    }

    #[test]
    fn record_version_appends_on_change() {
        let store = open_test_store();
        let nct_id = NctId::new("NCT00000003");
        let trial = store.ensure_trial(&nct_id, "Acme Pharma").unwrap();
        store
            .record_version(trial.id, serde_json::json!({"phase": "PHASE2"}))
            .unwrap();
        let (_, appended) = store
            .record_version(trial.id, serde_json::json!({"phase": "PHASE3"}))
            .unwrap();
        assert!(appended);
    }

    #[test]
    fn write_decision_requires_company_for_accept() {
        let store = open_test_store();
        let decision = ResolverDecisionRecord {
            run_id: RunId::new("resolver-20260101T000000Z"),
            nct_id: NctId::new("NCT00000004"),
            sponsor_text: "Acme".to_string(),
            mode: ResolverDecisionMode::Accept,
            company_id: None,
            probability: 0.99,
            top2_margin: 0.5,
            features: std::collections::BTreeMap::new(),
            leader_meta: serde_json::json!({}),
            decided_by: "auto".to_string(),
            notes: None,
            created_at: OffsetDateTime::now_utc(),
        };
        assert!(store.write_decision(&decision).is_err());
    }

    #[test]
    fn score_store_rejects_duplicate_writes() {
        let store = open_test_store();
        let nct_id = NctId::new("NCT00000005");
        let trial = store.ensure_trial(&nct_id, "Acme Pharma").unwrap();
        let score = ScoreResult {
            trial_id: trial.id,
            run_id: RunId::new("run-1"),
            prior: 0.15,
            logit_prior: -1.7,
            sum_log_lr: 0.0,
            logit_post: -1.7,
            p_fail: 0.15,
            gate_evals: vec![],
            stop_rules_applied: vec![],
            evidence_spans: vec![],
            created_at: OffsetDateTime::now_utc(),
        };
        store.write_score(&score).unwrap();
        assert!(store.write_score(&score).is_err());
    }
}
