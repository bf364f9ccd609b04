//! Software test specification record.
//!
//! # Responsibility
//! - Define the typed document describing one software testing spec.
//! - Provide the fixed demo records used to bootstrap a namespace.
//!
//! # Invariants
//! - `id` doubles as the world-state key.
//! - Wire names are camelCase; `docType` is omitted when unset.

use crate::model::document::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document field updated by `change_parties`.
pub const ALLOWED_PARTIES_FIELD: &str = "allowedParties";

/// `docType` marker attached to seeded records.
pub const SEED_DOC_TYPE: &str = "asset";

/// Typed view of a software testing specification document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSpec {
    /// Stable record key.
    pub id: String,
    /// Human-readable name of the tested feature.
    pub name: String,
    /// Software module identifier, e.g. `1.0`.
    pub module_version: String,
    /// Build version under test, e.g. `1.2.1.0`.
    pub version: String,
    /// Creation date as entered by the caller (not parsed).
    pub date: String,
    pub owner: String,
    /// Comma-separated list of parties allowed to see the spec.
    pub allowed_parties: String,
    pub source_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
}

impl TestSpec {
    /// Converts into the opaque document form persisted by repositories.
    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        serde_json::from_value::<Document>(serde_json::to_value(self)?)
    }

    /// Builds the typed view from a stored document.
    pub fn from_document(document: &Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(document.clone()))
    }
}

/// Returns the fixed bootstrap records (`ST001`..`ST003`).
pub fn seed_specs() -> Vec<TestSpec> {
    let seed = |id: &str, name: &str, module: &str, date: &str, owner: &str, parties: &str| {
        TestSpec {
            id: id.to_string(),
            name: name.to_string(),
            module_version: module.to_string(),
            version: "1.2.1.0".to_string(),
            date: date.to_string(),
            owner: owner.to_string(),
            allowed_parties: parties.to_string(),
            source_location: "/home/user/Desktop".to_string(),
            doc_type: Some(SEED_DOC_TYPE.to_string()),
        }
    };

    vec![
        seed("ST001", "Login Page", "1.0", "23/5/2022", "QC", "Customer"),
        seed(
            "ST002",
            "Registration Page",
            "1.1",
            "23/5/2022",
            "QC",
            "Project Manager",
        ),
        seed("ST003", "Upload file", "2.0", "20/5/2022", "ni", "Customer,PM"),
    ]
}
