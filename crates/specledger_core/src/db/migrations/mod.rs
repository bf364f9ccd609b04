//! Schema steps for the `records` table.
//!
//! `records` holds one row per key: `key` (TEXT primary key, BINARY
//! collation so scans come back in byte order), `value` (the document as
//! UTF-8 JSON text), `revision` (1 on insert, +1 per write) and millisecond
//! `created_at`/`updated_at` stamps.
//!
//! `PRAGMA user_version` stores the number of the last applied step.

use crate::db::{DbError, DbResult};
use log::debug;
use rusqlite::Connection;
use std::cmp::Ordering;

/// Step `n` (1-based) moves `user_version` from `n - 1` to `n`.
const SCHEMA_STEPS: &[&str] = &[include_str!("0001_records.sql")];

/// Schema version produced by running every known step.
pub fn latest_version() -> u32 {
    u32::try_from(SCHEMA_STEPS.len()).unwrap_or(u32::MAX)
}

/// Reads the schema version recorded in the database file.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Brings the schema up to `latest_version()` inside one transaction.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let found = schema_version(conn)?;
    let supported = latest_version();
    match found.cmp(&supported) {
        Ordering::Greater => return Err(DbError::UnsupportedSchemaVersion { found, supported }),
        Ordering::Equal => return Ok(()),
        Ordering::Less => {}
    }

    let tx = conn.transaction()?;
    let pending = (1u32..)
        .zip(SCHEMA_STEPS.iter())
        .skip(usize::try_from(found).unwrap_or(usize::MAX));
    for (version, sql) in pending {
        tx.execute_batch(sql)
            .map_err(|source| DbError::Migration { version, source })?;
        tx.pragma_update(None, "user_version", version)?;
        debug!("event=db_migrate module=db status=ok version={version}");
    }
    tx.commit()?;

    Ok(())
}
