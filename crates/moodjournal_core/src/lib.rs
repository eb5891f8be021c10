//! Core storage for the mood journal.
//! This crate is the single source of truth for journal invariants: schema
//! migration, identity, entry ids and export format.

pub mod codec;
pub mod config;
pub mod db;
pub mod export;
pub mod frozen;
pub mod identity;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;

pub use codec::{derive_id, is_derived_id, iso8601};
pub use config::{AppConfig, ConfigError, StoreConfig};
pub use db::migrations::latest_version;
pub use db::{OpenLock, OpenTicket};
pub use export::{BundleEntry, BundleError, EntryKey, ExportBundle};
pub use frozen::Frozen;
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::entry::{ClientId, Entry, EntryContent, EntryId, Mood};
pub use repo::journal_repo::{JournalRepository, RepoError, RepoResult, SqliteJournalRepository};
pub use store::{import_store_name, Store, StoreError, StoreOptions, StoreResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
