//! Core of the software testing spec ledger.
//!
//! A world-state style record store (one JSON document per string key) with
//! existence checks, create/update guards, ordered scans, and a thin
//! contract facade on top.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, LedgerConfig, LoggingOptions, StorageOptions};
pub use logging::{default_log_level, init_logging, init_logging_from, logging_status};
pub use model::document::{Document, ScanEntry, ScanRecord};
pub use model::test_spec::{seed_specs, TestSpec, ALLOWED_PARTIES_FIELD};
pub use repo::memory_repo::MemoryRecordRepository;
pub use repo::record_repo::{
    RecordOp, RecordRepository, RepoError, RepoResult, ScanAll, VersionedDocument,
};
pub use repo::sqlite_repo::SqliteRecordRepository;
pub use service::spec_contract::SpecContract;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
