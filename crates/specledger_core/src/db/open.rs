//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Apply connection pragmas and run migrations before handing a connection out.

use super::migrations::apply_migrations;
use super::DbResult;
use crate::config::StorageOptions;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

/// Opens a SQLite database file and applies all pending migrations.
///
/// Emits `db_open` events with duration and status.
pub fn open_db(path: impl AsRef<Path>, options: &StorageOptions) -> DbResult<Connection> {
    open_logged("file", options, || Connection::open(path))
}

/// Opens an in-memory SQLite database and applies all pending migrations.
pub fn open_db_in_memory(options: &StorageOptions) -> DbResult<Connection> {
    open_logged("memory", options, Connection::open_in_memory)
}

/// Opens the database selected by `options.db_path`, or memory when unset.
pub fn open_with_options(options: &StorageOptions) -> DbResult<Connection> {
    match options.db_path.as_ref() {
        Some(path) => open_db(path, options),
        None => open_db_in_memory(options),
    }
}

fn open_logged(
    mode: &str,
    options: &StorageOptions,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match connect() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, options) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, options: &StorageOptions) -> DbResult<()> {
    conn.busy_timeout(options.busy_timeout())?;
    apply_migrations(conn)?;
    Ok(())
}
