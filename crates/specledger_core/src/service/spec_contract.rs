//! Software testing spec contract facade.
//!
//! # Responsibility
//! - Expose the contract's callable operations over an injected repository.
//! - Serialize list results into the JSON shape returned to callers.
//!
//! # Invariants
//! - The facade never writes storage except through `RecordRepository`.
//! - Typed specs are stored under their own `id`.
//! - Single-value assets are stored as `{"value": <string>}`.

use crate::model::document::{Document, ScanEntry};
use crate::model::test_spec::{seed_specs, TestSpec, ALLOWED_PARTIES_FIELD};
use crate::repo::record_repo::{RecordOp, RecordRepository, RepoError, RepoResult};
use log::{debug, info, warn};
use serde_json::Value;

const ASSET_VALUE_FIELD: &str = "value";

/// Contract facade over a record repository.
pub struct SpecContract<R: RecordRepository> {
    repo: R,
}

impl<R: RecordRepository> SpecContract<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Borrow the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn spec_exists(&self, key: &str) -> RepoResult<bool> {
        self.repo.exists(key)
    }

    /// Creates a spec under `spec.id`.
    pub fn create_spec(&self, spec: &TestSpec) -> RepoResult<()> {
        let document = spec.to_document()?;
        self.create_record(&spec.id, &document)
    }

    /// Creates an arbitrary document under `key`.
    pub fn create_record(&self, key: &str, document: &Document) -> RepoResult<()> {
        logged("create", key, self.repo.create(key, document))
    }

    /// Returns the stored document unchanged.
    pub fn read_spec(&self, key: &str) -> RepoResult<Document> {
        self.repo.read(key)
    }

    /// Returns the stored document as a typed spec.
    ///
    /// A document lacking spec fields is reported as `Malformed`.
    pub fn read_spec_typed(&self, key: &str) -> RepoResult<TestSpec> {
        let document = self.repo.read(key)?;
        TestSpec::from_document(&document).map_err(|err| RepoError::Malformed {
            op: RecordOp::Read,
            key: key.to_string(),
            message: err.to_string(),
        })
    }

    /// Replaces the whole spec stored under `spec.id`.
    pub fn update_spec(&self, spec: &TestSpec) -> RepoResult<()> {
        let document = spec.to_document()?;
        self.update_record(&spec.id, &document)
    }

    pub fn update_record(&self, key: &str, document: &Document) -> RepoResult<()> {
        logged("update", key, self.repo.update(key, document))
    }

    pub fn delete_spec(&self, key: &str) -> RepoResult<()> {
        logged("delete", key, self.repo.delete(key))
    }

    /// Replaces the allowed-parties list, leaving every other field intact.
    pub fn change_parties(&self, key: &str, parties: &str) -> RepoResult<()> {
        logged(
            "change_parties",
            key,
            self.repo
                .set_field(key, ALLOWED_PARTIES_FIELD, Value::String(parties.to_string())),
        )
    }

    /// Collects every stored record in ascending key order.
    pub fn scan_entries(&self) -> RepoResult<Vec<ScanEntry>> {
        let entries = self.repo.scan_all().collect::<RepoResult<Vec<_>>>()?;
        let raw_count = entries.iter().filter(|entry| entry.record.is_raw()).count();
        if raw_count > 0 {
            warn!(
                "event=get_all_results module=contract status=degraded raw_records={raw_count}"
            );
        }
        Ok(entries)
    }

    /// Returns all records as a JSON array of `{key, record}` objects.
    pub fn get_all_results(&self) -> RepoResult<String> {
        let entries = self.scan_entries()?;
        debug!(
            "event=get_all_results module=contract status=ok count={}",
            entries.len()
        );
        Ok(serde_json::to_string(&entries)?)
    }

    /// Seeds the fixed demo specs, overwriting same-id records.
    pub fn init_ledger(&self) -> RepoResult<usize> {
        let records = seed_specs()
            .into_iter()
            .map(|spec| -> RepoResult<(String, Document)> {
                let document = spec.to_document()?;
                Ok((spec.id, document))
            })
            .collect::<RepoResult<Vec<_>>>()?;

        let keys = records
            .iter()
            .map(|(key, _)| key.as_str())
            .collect::<Vec<_>>()
            .join(",");
        logged("init_ledger", &keys, self.repo.init_seed(&records))
    }

    pub fn asset_exists(&self, key: &str) -> RepoResult<bool> {
        self.repo.exists(key)
    }

    pub fn create_asset(&self, key: &str, value: &str) -> RepoResult<()> {
        self.create_record(key, &asset_document(value))
    }

    /// Returns the string stored by `create_asset`/`update_asset`.
    pub fn read_asset(&self, key: &str) -> RepoResult<String> {
        let document = self.repo.read(key)?;
        match document.get(ASSET_VALUE_FIELD) {
            Some(Value::String(value)) => Ok(value.clone()),
            _ => Err(RepoError::Malformed {
                op: RecordOp::Read,
                key: key.to_string(),
                message: "asset has no string `value` field".to_string(),
            }),
        }
    }

    pub fn update_asset(&self, key: &str, value: &str) -> RepoResult<()> {
        self.update_record(key, &asset_document(value))
    }

    pub fn delete_asset(&self, key: &str) -> RepoResult<()> {
        self.delete_spec(key)
    }
}

fn asset_document(value: &str) -> Document {
    let mut document = Document::new();
    document.insert(
        ASSET_VALUE_FIELD.to_string(),
        Value::String(value.to_string()),
    );
    document
}

fn logged<T>(op: &str, key: &str, result: RepoResult<T>) -> RepoResult<T> {
    match &result {
        Ok(_) => info!("event={op} module=contract status=ok key={key}"),
        Err(err) => warn!(
            "event={op} module=contract status=error key={key} error_code={} error={err}",
            err.kind()
        ),
    }
    result
}
