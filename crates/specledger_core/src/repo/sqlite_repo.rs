//! SQLite-backed record store.
//!
//! # Responsibility
//! - Persist documents as UTF-8 JSON text in the `records` table.
//! - Serialize all access through one connection guarded by a mutex.
//!
//! # Invariants
//! - Check-then-write sequences run inside one immediate transaction.
//! - Key order follows SQLite BINARY collation (byte order).

use crate::config::StorageOptions;
use crate::db::migrations::apply_migrations;
use crate::db::open_with_options;
use crate::model::document::{encode_document, Document};
use crate::repo::record_repo::{
    decode_stored, RawEntry, RecordOp, RecordRepository, RepoError, RepoResult,
    VersionedDocument, DEFAULT_SCAN_BATCH_SIZE,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};

const NOW_MS_SQL: &str = "(strftime('%s', 'now') * 1000)";

/// SQLite record repository owning its connection.
pub struct SqliteRecordRepository {
    conn: Mutex<Connection>,
    scan_batch_size: usize,
}

impl SqliteRecordRepository {
    /// Wraps a connection, applying any pending migrations first.
    pub fn try_new(mut conn: Connection) -> RepoResult<Self> {
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        })
    }

    /// Opens the database described by `options` and wraps it.
    pub fn open(options: &StorageOptions) -> RepoResult<Self> {
        let conn = open_with_options(options)?;
        Ok(Self::try_new(conn)?.with_scan_batch_size(options.scan_batch_size))
    }

    pub fn with_scan_batch_size(mut self, scan_batch_size: usize) -> Self {
        self.scan_batch_size = scan_batch_size.max(1);
        self
    }

    /// Releases the underlying connection.
    pub fn into_inner(self) -> Connection {
        self.conn.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    // A panic mid-transaction rolls the transaction back on unwind, so a
    // poisoned connection is still consistent.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordRepository for SqliteRecordRepository {
    fn exists(&self, key: &str) -> RepoResult<bool> {
        with_key(RecordOp::Exists, key, || {
            let exists: i64 = self.conn().query_row(
                "SELECT EXISTS(SELECT 1 FROM records WHERE key = ?1);",
                [key],
                |row| row.get(0),
            )?;
            Ok(exists == 1)
        })
    }

    fn create(&self, key: &str, document: &Document) -> RepoResult<()> {
        let value = encode_document(document)?;
        with_key(RecordOp::Create, key, || {
            let changed = self.conn().execute(
                "INSERT INTO records (key, value, revision)
                 VALUES (?1, ?2, 1)
                 ON CONFLICT(key) DO NOTHING;",
                params![key, value],
            )?;

            if changed == 0 {
                return Err(RepoError::already_exists(RecordOp::Create, key));
            }
            Ok(())
        })
    }

    fn read_versioned(&self, key: &str) -> RepoResult<VersionedDocument> {
        with_key(RecordOp::Read, key, || {
            let row = select_value(&self.conn(), key)?;
            let (value, revision) =
                row.ok_or_else(|| RepoError::not_found(RecordOp::Read, key))?;
            Ok(VersionedDocument {
                document: decode_stored(RecordOp::Read, key, &value)?,
                revision,
            })
        })
    }

    fn update(&self, key: &str, document: &Document) -> RepoResult<()> {
        let value = encode_document(document)?;
        with_key(RecordOp::Update, key, || {
            let changed = self.conn().execute(
                &format!(
                    "UPDATE records
                     SET value = ?2, revision = revision + 1, updated_at = {NOW_MS_SQL}
                     WHERE key = ?1;"
                ),
                params![key, value],
            )?;

            if changed == 0 {
                return Err(RepoError::not_found(RecordOp::Update, key));
            }
            Ok(())
        })
    }

    fn update_if_revision(
        &self,
        key: &str,
        expected_revision: u64,
        document: &Document,
    ) -> RepoResult<u64> {
        let value = encode_document(document)?;
        with_key(RecordOp::Update, key, || {
            let mut conn = self.conn();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let (_, actual) = select_value(&tx, key)?
                .ok_or_else(|| RepoError::not_found(RecordOp::Update, key))?;
            if actual != expected_revision {
                return Err(RepoError::RevisionConflict {
                    key: key.to_string(),
                    expected: expected_revision,
                    actual,
                });
            }

            let next = actual + 1;
            write_value(&tx, key, &value, next)?;
            tx.commit()?;
            Ok(next)
        })
    }

    fn delete(&self, key: &str) -> RepoResult<()> {
        with_key(RecordOp::Delete, key, || {
            let changed = self
                .conn()
                .execute("DELETE FROM records WHERE key = ?1;", [key])?;

            if changed == 0 {
                return Err(RepoError::not_found(RecordOp::Delete, key));
            }
            Ok(())
        })
    }

    fn set_field(&self, key: &str, field: &str, value: Value) -> RepoResult<()> {
        with_key(RecordOp::SetField, key, || {
            let mut conn = self.conn();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let (stored, revision) = select_value(&tx, key)?
                .ok_or_else(|| RepoError::not_found(RecordOp::SetField, key))?;
            let mut document = decode_stored(RecordOp::SetField, key, &stored)?;
            document.insert(field.to_string(), value);

            write_value(&tx, key, &encode_document(&document)?, revision + 1)?;
            tx.commit()?;
            Ok(())
        })
    }

    fn put(&self, key: &str, document: &Document) -> RepoResult<()> {
        let value = encode_document(document)?;
        with_key(RecordOp::Put, key, || {
            self.conn().execute(
                &format!(
                    "INSERT INTO records (key, value, revision)
                     VALUES (?1, ?2, 1)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        revision = records.revision + 1,
                        updated_at = {NOW_MS_SQL}
                     WHERE records.value <> excluded.value;"
                ),
                params![key, value],
            )?;
            Ok(())
        })
    }

    fn scan_page(&self, after: Option<&str>, limit: usize) -> RepoResult<Vec<RawEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key, value
             FROM records
             WHERE ?1 IS NULL OR key > ?1
             ORDER BY key ASC
             LIMIT ?2;",
        )?;

        let mut rows = stmt.query(params![after, limit])?;
        let mut entries: Vec<RawEntry> = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push((row.get("key")?, row.get("value")?));
        }
        Ok(entries)
    }

    fn scan_batch_size(&self) -> usize {
        self.scan_batch_size
    }
}

/// Runs one keyed operation, tagging backend failures with `op` and `key`.
fn with_key<T>(op: RecordOp, key: &str, run: impl FnOnce() -> RepoResult<T>) -> RepoResult<T> {
    run().map_err(|err| err.in_context(op, key))
}

fn select_value(conn: &Connection, key: &str) -> RepoResult<Option<(String, u64)>> {
    let row = conn
        .query_row(
            "SELECT value, revision FROM records WHERE key = ?1;",
            [key],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    Ok(row.map(|(value, revision)| (value, revision_from_db(revision))))
}

fn write_value(conn: &Connection, key: &str, value: &str, revision: u64) -> RepoResult<()> {
    conn.execute(
        &format!(
            "UPDATE records
             SET value = ?2, revision = ?3, updated_at = {NOW_MS_SQL}
             WHERE key = ?1;"
        ),
        params![key, value, revision_to_db(revision)],
    )?;
    Ok(())
}

fn revision_from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn revision_to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
