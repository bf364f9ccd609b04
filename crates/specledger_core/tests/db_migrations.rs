use rusqlite::Connection;
use specledger_core::db::migrations::{latest_version, schema_version};
use specledger_core::db::{open_db, open_db_in_memory, DbError};
use specledger_core::{RecordRepository, RepoError, SqliteRecordRepository, StorageOptions};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory(&StorageOptions::default()).unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    assert_table_exists(&conn, "records");
}

#[test]
fn opening_same_database_twice_keeps_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("specledger.sqlite3");
    let options = StorageOptions::default();

    {
        let repo = SqliteRecordRepository::try_new(open_db(&path, &options).unwrap()).unwrap();
        repo.create("1001", &serde_json::Map::new()).unwrap();
    }

    let conn = open_db(&path, &options).unwrap();
    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    let repo = SqliteRecordRepository::try_new(conn).unwrap();
    assert!(repo.exists("1001").unwrap());
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path, &StorageOptions::default()).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion { found, supported } => {
            assert_eq!(found, 999);
            assert_eq!(supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repository_migrates_a_bare_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(conn).unwrap();
    assert!(!repo.exists("anything").unwrap());

    let conn = repo.into_inner();
    assert_eq!(schema_version(&conn).unwrap(), latest_version());
}

#[test]
fn open_with_configured_path_uses_file() {
    let dir = tempfile::tempdir().unwrap();
    let options = StorageOptions {
        db_path: Some(dir.path().join("configured.sqlite3")),
        ..StorageOptions::default()
    };

    let repo = SqliteRecordRepository::open(&options).unwrap();
    repo.create("ST001", &serde_json::Map::new()).unwrap();
    drop(repo);

    let reopened = SqliteRecordRepository::open(&options).unwrap();
    let err = reopened
        .create("ST001", &serde_json::Map::new())
        .unwrap_err();
    assert!(matches!(err, RepoError::AlreadyExists { .. }));
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}

#[test]
fn fresh_connection_reports_schema_zero_until_migrated() {
    let mut conn = Connection::open_in_memory().unwrap();
    assert_eq!(schema_version(&conn).unwrap(), 0);

    specledger_core::db::migrations::apply_migrations(&mut conn).unwrap();
    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    assert_table_exists(&conn, "records");

    specledger_core::db::migrations::apply_migrations(&mut conn).unwrap();
    assert_eq!(schema_version(&conn).unwrap(), latest_version());
}
