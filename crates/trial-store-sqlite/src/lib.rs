// crates/trial-store-sqlite/src/lib.rs
// ============================================================================
// Module: Trial Store SQLite Library
// Description: Public API surface for the SQLite-backed persistent store.
// Purpose: Expose the store type, its configuration, and its errors.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! This crate is the sole persistence backend for the trial-intelligence
//! core. Every named relation in the data model (trials, versions, the
//! sponsor graph, documents and links, resolver decisions and review items,
//! scores, catalyst windows) is a table here; every write the rest of the
//! workspace performs against the domain goes through [`store::SqliteStore`].

pub mod store;

pub use store::MAX_STATE_BYTES;
pub use store::SCHEMA_VERSION;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
