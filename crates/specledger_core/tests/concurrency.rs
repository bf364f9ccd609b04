use serde_json::json;
use specledger_core::db::open_db;
use specledger_core::{
    Document, MemoryRecordRepository, RecordRepository, SqliteRecordRepository, StorageOptions,
};
use std::sync::Arc;
use std::thread;

const WRITERS: usize = 8;
const WRITES_PER_THREAD: usize = 25;

fn concurrent_set_field_keeps_every_update<R: RecordRepository + 'static>(repo: Arc<R>) {
    repo.create("ST001", &Document::new()).unwrap();

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                for write in 0..WRITES_PER_THREAD {
                    repo.set_field("ST001", &format!("w{writer}_{write}"), json!(write))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stored = repo.read_versioned("ST001").unwrap();
    assert_eq!(stored.document.len(), WRITERS * WRITES_PER_THREAD);
    assert_eq!(stored.revision, 1 + (WRITERS * WRITES_PER_THREAD) as u64);
}

fn concurrent_creates_on_disjoint_keys_all_land<R: RecordRepository + 'static>(repo: Arc<R>) {
    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                for write in 0..WRITES_PER_THREAD {
                    let key = format!("k{writer:02}-{write:03}");
                    repo.create(&key, &Document::new()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(repo.scan_all().count(), WRITERS * WRITES_PER_THREAD);
}

fn racing_creates_on_same_key_have_one_winner<R: RecordRepository + 'static>(repo: Arc<R>) {
    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                let mut document = Document::new();
                document.insert("writer".to_string(), json!(writer));
                repo.create("1001", &document).is_ok()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(repo.read_versioned("1001").unwrap().revision, 1);
}

fn file_backed_sqlite() -> (tempfile::TempDir, Arc<SqliteRecordRepository>) {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("ledger.sqlite3"), &StorageOptions::default()).unwrap();
    let repo = SqliteRecordRepository::try_new(conn).unwrap();
    (dir, Arc::new(repo))
}

#[test]
fn set_field_does_not_lose_concurrent_updates() {
    let (_dir, sqlite) = file_backed_sqlite();
    concurrent_set_field_keeps_every_update(sqlite);
    concurrent_set_field_keeps_every_update(Arc::new(MemoryRecordRepository::new()));
}

#[test]
fn disjoint_key_writers_do_not_interfere() {
    let (_dir, sqlite) = file_backed_sqlite();
    concurrent_creates_on_disjoint_keys_all_land(sqlite);
    concurrent_creates_on_disjoint_keys_all_land(Arc::new(MemoryRecordRepository::new()));
}

#[test]
fn only_one_racing_create_succeeds() {
    let (_dir, sqlite) = file_backed_sqlite();
    racing_creates_on_same_key_have_one_winner(sqlite);
    racing_creates_on_same_key_have_one_winner(Arc::new(MemoryRecordRepository::new()));
}
