//! In-memory record store.
//!
//! Used as the injected fake in tests and for throwaway demo namespaces.
//! Values are kept in their persisted JSON text form so decode behavior
//! matches the SQLite backend.

use crate::model::document::{encode_document, Document};
use crate::repo::record_repo::{
    decode_stored, RawEntry, RecordOp, RecordRepository, RepoError, RepoResult,
    VersionedDocument, DEFAULT_SCAN_BATCH_SIZE,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
struct StoredRecord {
    value: String,
    revision: u64,
}

/// `BTreeMap`-backed repository; writers take the exclusive lock.
#[derive(Debug)]
pub struct MemoryRecordRepository {
    records: RwLock<BTreeMap<String, StoredRecord>>,
    scan_batch_size: usize,
}

impl Default for MemoryRecordRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordRepository {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        }
    }

    pub fn with_scan_batch_size(mut self, scan_batch_size: usize) -> Self {
        self.scan_batch_size = scan_batch_size.max(1);
        self
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    // Every mutation is decided before the map is touched, so a poisoned
    // lock never guards a half-applied write.
    fn read_guard(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordRepository for MemoryRecordRepository {
    fn exists(&self, key: &str) -> RepoResult<bool> {
        Ok(self.read_guard().contains_key(key))
    }

    fn create(&self, key: &str, document: &Document) -> RepoResult<()> {
        let value = encode_document(document)?;
        let mut records = self.write_guard();
        if records.contains_key(key) {
            return Err(RepoError::already_exists(RecordOp::Create, key));
        }
        records.insert(key.to_string(), StoredRecord { value, revision: 1 });
        Ok(())
    }

    fn read_versioned(&self, key: &str) -> RepoResult<VersionedDocument> {
        let records = self.read_guard();
        let stored = records
            .get(key)
            .ok_or_else(|| RepoError::not_found(RecordOp::Read, key))?;
        Ok(VersionedDocument {
            document: decode_stored(RecordOp::Read, key, &stored.value)?,
            revision: stored.revision,
        })
    }

    fn update(&self, key: &str, document: &Document) -> RepoResult<()> {
        let value = encode_document(document)?;
        let mut records = self.write_guard();
        let stored = records
            .get_mut(key)
            .ok_or_else(|| RepoError::not_found(RecordOp::Update, key))?;
        stored.value = value;
        stored.revision += 1;
        Ok(())
    }

    fn update_if_revision(
        &self,
        key: &str,
        expected_revision: u64,
        document: &Document,
    ) -> RepoResult<u64> {
        let value = encode_document(document)?;
        let mut records = self.write_guard();
        let stored = records
            .get_mut(key)
            .ok_or_else(|| RepoError::not_found(RecordOp::Update, key))?;
        if stored.revision != expected_revision {
            return Err(RepoError::RevisionConflict {
                key: key.to_string(),
                expected: expected_revision,
                actual: stored.revision,
            });
        }
        stored.value = value;
        stored.revision += 1;
        Ok(stored.revision)
    }

    fn delete(&self, key: &str) -> RepoResult<()> {
        self.write_guard()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| RepoError::not_found(RecordOp::Delete, key))
    }

    fn set_field(&self, key: &str, field: &str, value: Value) -> RepoResult<()> {
        let mut records = self.write_guard();
        let stored = records
            .get_mut(key)
            .ok_or_else(|| RepoError::not_found(RecordOp::SetField, key))?;

        let mut document = decode_stored(RecordOp::SetField, key, &stored.value)?;
        document.insert(field.to_string(), value);
        stored.value = encode_document(&document)?;
        stored.revision += 1;
        Ok(())
    }

    fn put(&self, key: &str, document: &Document) -> RepoResult<()> {
        let value = encode_document(document)?;
        let mut records = self.write_guard();
        match records.get_mut(key) {
            Some(stored) if stored.value == value => {}
            Some(stored) => {
                stored.value = value;
                stored.revision += 1;
            }
            None => {
                records.insert(key.to_string(), StoredRecord { value, revision: 1 });
            }
        }
        Ok(())
    }

    fn scan_page(&self, after: Option<&str>, limit: usize) -> RepoResult<Vec<RawEntry>> {
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let records = self.read_guard();
        Ok(records
            .range::<str, _>((lower, Bound::Unbounded))
            .take(limit)
            .map(|(key, stored)| (key.clone(), stored.value.clone()))
            .collect())
    }

    fn scan_batch_size(&self) -> usize {
        self.scan_batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryRecordRepository;
    use crate::model::document::Document;
    use crate::repo::record_repo::RecordRepository;
    use serde_json::json;

    fn doc(value: &str) -> Document {
        let mut document = Document::new();
        document.insert("value".to_string(), json!(value));
        document
    }

    #[test]
    fn scan_page_resumes_after_cursor() {
        let repo = MemoryRecordRepository::new();
        for key in ["b", "a", "d", "c"] {
            repo.create(key, &doc(key)).unwrap();
        }

        let first = repo.scan_page(None, 2).unwrap();
        assert_eq!(
            first.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        let second = repo.scan_page(Some("b"), 2).unwrap();
        assert_eq!(
            second.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            vec!["c", "d"]
        );
        assert!(repo.scan_page(Some("d"), 2).unwrap().is_empty());
    }

    #[test]
    fn put_with_identical_document_keeps_revision() {
        let repo = MemoryRecordRepository::new();
        repo.put("k", &doc("v1")).unwrap();
        repo.put("k", &doc("v1")).unwrap();
        assert_eq!(repo.read_versioned("k").unwrap().revision, 1);

        repo.put("k", &doc("v2")).unwrap();
        assert_eq!(repo.read_versioned("k").unwrap().revision, 2);
        assert_eq!(repo.len(), 1);
    }
}
