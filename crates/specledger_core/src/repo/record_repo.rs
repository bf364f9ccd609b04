//! Record store capability interface, errors and lazy scan iterator.
//!
//! # Responsibility
//! - Define `RecordRepository`, the only way stored documents are mutated.
//! - Define semantic errors naming the failed operation and key.
//! - Provide keyset-paginated full scans shared by all backends.
//!
//! # Invariants
//! - `create` fails on present keys; `read`/`update`/`delete`/`set_field`
//!   fail on absent keys.
//! - Every successful write bumps the stored revision by one; writes that
//!   leave the stored value byte-identical (`put` of the same document) do not.
//! - A malformed stored value never aborts a scan.

use crate::db::DbError;
use crate::model::document::{decode_document, Document, ScanEntry, ScanRecord};
use serde_json::Value;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Page size used when a backend is not configured otherwise.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 100;

pub type RepoResult<T> = Result<T, RepoError>;

/// Operation names carried by errors and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOp {
    Exists,
    Create,
    Read,
    Update,
    Delete,
    SetField,
    Put,
    Scan,
}

impl RecordOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::SetField => "set_field",
            Self::Put => "put",
            Self::Scan => "scan",
        }
    }
}

impl Display for RecordOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record store error.
#[derive(Debug)]
pub enum RepoError {
    /// `create` on a key that is present.
    AlreadyExists { op: RecordOp, key: String },
    /// Any keyed operation other than `create`/`exists`/`put` on an absent key.
    NotFound { op: RecordOp, key: String },
    /// Stored value is not a JSON object.
    Malformed {
        op: RecordOp,
        key: String,
        message: String,
    },
    /// Optimistic update lost against a concurrent writer.
    RevisionConflict {
        key: String,
        expected: u64,
        actual: u64,
    },
    /// Backend failure while serving a keyed operation.
    Storage {
        op: RecordOp,
        key: String,
        source: DbError,
    },
    Serialization(serde_json::Error),
    Db(DbError),
}

impl RepoError {
    pub(crate) fn not_found(op: RecordOp, key: &str) -> Self {
        Self::NotFound {
            op,
            key: key.to_string(),
        }
    }

    pub(crate) fn already_exists(op: RecordOp, key: &str) -> Self {
        Self::AlreadyExists {
            op,
            key: key.to_string(),
        }
    }

    /// Attaches `op` and `key` to backend failures that lack them.
    pub(crate) fn in_context(self, op: RecordOp, key: &str) -> Self {
        match self {
            Self::Db(source) => Self::Storage {
                op,
                key: key.to_string(),
                source,
            },
            other => other,
        }
    }

    /// Stable machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "already_exists",
            Self::NotFound { .. } => "not_found",
            Self::Malformed { .. } => "malformed",
            Self::RevisionConflict { .. } => "revision_conflict",
            Self::Serialization(_) => "serialization",
            Self::Storage { .. } | Self::Db(_) => "db",
        }
    }

    /// Key the failure is about, when it concerns a single record.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::AlreadyExists { key, .. }
            | Self::NotFound { key, .. }
            | Self::Malformed { key, .. }
            | Self::RevisionConflict { key, .. }
            | Self::Storage { key, .. } => Some(key),
            Self::Serialization(_) | Self::Db(_) => None,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyExists { op, key } => {
                write!(f, "{op} failed: record `{key}` already exists")
            }
            Self::NotFound { op, key } => write!(f, "{op} failed: record `{key}` does not exist"),
            Self::Malformed { op, key, message } => {
                write!(f, "{op} failed: record `{key}` is malformed: {message}")
            }
            Self::RevisionConflict {
                key,
                expected,
                actual,
            } => write!(
                f,
                "update failed: record `{key}` is at revision {actual}, expected {expected}"
            ),
            Self::Storage { op, key, source } => {
                write!(f, "{op} failed: record `{key}` storage error: {source}")
            }
            Self::Serialization(err) => write!(f, "document serialization failed: {err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Serialization(err) => Some(err),
            Self::Storage { source, .. } | Self::Db(source) => Some(source),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Document together with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedDocument {
    pub document: Document,
    pub revision: u64,
}

/// One persisted row as returned by `scan_page`: key and raw stored text.
pub type RawEntry = (String, String);

/// Capability interface over the world-state namespace.
///
/// Implementations must make each method atomic with respect to the key it
/// touches.
pub trait RecordRepository: Send + Sync {
    /// Returns whether `key` is present. Absent keys are not an error.
    fn exists(&self, key: &str) -> RepoResult<bool>;

    /// Stores `document` under a key that must be absent.
    fn create(&self, key: &str, document: &Document) -> RepoResult<()>;

    /// Returns the stored document and its revision.
    fn read_versioned(&self, key: &str) -> RepoResult<VersionedDocument>;

    /// Replaces the whole stored document.
    fn update(&self, key: &str, document: &Document) -> RepoResult<()>;

    /// Replaces the stored document only while it is still at `expected_revision`.
    ///
    /// Returns the new revision.
    fn update_if_revision(
        &self,
        key: &str,
        expected_revision: u64,
        document: &Document,
    ) -> RepoResult<u64>;

    fn delete(&self, key: &str) -> RepoResult<()>;

    /// Sets one top-level field, keeping every other field as stored.
    fn set_field(&self, key: &str, field: &str, value: Value) -> RepoResult<()>;

    /// Unconditional upsert used for bootstrapping.
    fn put(&self, key: &str, document: &Document) -> RepoResult<()>;

    /// Returns up to `limit` rows with keys strictly greater than `after`,
    /// in ascending key order.
    fn scan_page(&self, after: Option<&str>, limit: usize) -> RepoResult<Vec<RawEntry>>;

    fn scan_batch_size(&self) -> usize {
        DEFAULT_SCAN_BATCH_SIZE
    }

    /// Returns the stored document.
    fn read(&self, key: &str) -> RepoResult<Document> {
        self.read_versioned(key).map(|versioned| versioned.document)
    }

    /// Lazily iterates every stored record in ascending key order.
    ///
    /// Dropping the iterator early is always safe; no lock is held between pages.
    fn scan_all(&self) -> ScanAll<'_, Self>
    where
        Self: Sized,
    {
        ScanAll::new(self, self.scan_batch_size())
    }

    /// Overwrites each `(key, document)` pair. Running it twice leaves the
    /// same state as running it once. Not atomic across keys.
    fn init_seed(&self, records: &[(String, Document)]) -> RepoResult<usize> {
        for (key, document) in records {
            self.put(key, document)?;
        }
        Ok(records.len())
    }
}

impl<R: RecordRepository + ?Sized> RecordRepository for Arc<R> {
    fn exists(&self, key: &str) -> RepoResult<bool> {
        (**self).exists(key)
    }

    fn create(&self, key: &str, document: &Document) -> RepoResult<()> {
        (**self).create(key, document)
    }

    fn read_versioned(&self, key: &str) -> RepoResult<VersionedDocument> {
        (**self).read_versioned(key)
    }

    fn update(&self, key: &str, document: &Document) -> RepoResult<()> {
        (**self).update(key, document)
    }

    fn update_if_revision(
        &self,
        key: &str,
        expected_revision: u64,
        document: &Document,
    ) -> RepoResult<u64> {
        (**self).update_if_revision(key, expected_revision, document)
    }

    fn delete(&self, key: &str) -> RepoResult<()> {
        (**self).delete(key)
    }

    fn set_field(&self, key: &str, field: &str, value: Value) -> RepoResult<()> {
        (**self).set_field(key, field, value)
    }

    fn put(&self, key: &str, document: &Document) -> RepoResult<()> {
        (**self).put(key, document)
    }

    fn scan_page(&self, after: Option<&str>, limit: usize) -> RepoResult<Vec<RawEntry>> {
        (**self).scan_page(after, limit)
    }

    fn scan_batch_size(&self) -> usize {
        (**self).scan_batch_size()
    }
}

/// Decodes a stored value read on behalf of `op`.
pub(crate) fn decode_stored(op: RecordOp, key: &str, raw: &str) -> RepoResult<Document> {
    decode_document(raw).map_err(|err| RepoError::Malformed {
        op,
        key: key.to_string(),
        message: err.message(),
    })
}

/// Lazy iterator returned by `RecordRepository::scan_all`.
///
/// Pages are fetched on demand; a page-level storage error is yielded once
/// and ends the iteration.
pub struct ScanAll<'a, R: RecordRepository + ?Sized> {
    repo: &'a R,
    batch_size: usize,
    cursor: Option<String>,
    buffer: VecDeque<RawEntry>,
    exhausted: bool,
}

impl<'a, R: RecordRepository + ?Sized> ScanAll<'a, R> {
    pub fn new(repo: &'a R, batch_size: usize) -> Self {
        Self {
            repo,
            batch_size: batch_size.max(1),
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fill(&mut self) -> RepoResult<()> {
        let page = self
            .repo
            .scan_page(self.cursor.as_deref(), self.batch_size)?;
        if page.len() < self.batch_size {
            self.exhausted = true;
        }
        if let Some((last_key, _)) = page.last() {
            self.cursor = Some(last_key.clone());
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<R: RecordRepository + ?Sized> Iterator for ScanAll<'_, R> {
    type Item = RepoResult<ScanEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fill() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }

        let (key, raw) = self.buffer.pop_front()?;
        Some(Ok(ScanEntry {
            key,
            record: ScanRecord::from_stored(raw),
        }))
    }
}
