//! Opaque JSON document and scan entry shapes.
//!
//! # Responsibility
//! - Encode/decode documents to their persisted UTF-8 JSON form.
//! - Represent scan results that may carry unparseable raw values.
//!
//! # Invariants
//! - `encode_document` output always decodes back to an equal document.
//! - `ScanRecord::Raw` is only produced when stored text is not valid JSON.

use serde::Serialize;
use serde_json::{Map, Value};

/// Field-name to value mapping stored under one key.
pub type Document = Map<String, Value>;

/// Reason a persisted value could not be decoded as a `Document`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Stored text is not JSON at all.
    InvalidJson(String),
    /// Stored text is JSON, but not an object.
    NotAnObject(&'static str),
}

impl DecodeError {
    pub fn message(&self) -> String {
        match self {
            Self::InvalidJson(message) => format!("invalid json: {message}"),
            Self::NotAnObject(found) => format!("expected json object, found {found}"),
        }
    }
}

/// Serializes a document into its persisted form.
pub fn encode_document(document: &Document) -> Result<String, serde_json::Error> {
    serde_json::to_string(document)
}

/// Parses a persisted value into a document.
pub fn decode_document(raw: &str) -> Result<Document, DecodeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| DecodeError::InvalidJson(err.to_string()))?;
    match value {
        Value::Object(document) => Ok(document),
        other => Err(DecodeError::NotAnObject(json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Value half of a scan entry.
///
/// Serialized untagged, so a raw value shows up as a plain JSON string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScanRecord {
    /// Stored text parsed as JSON (usually an object).
    Parsed(Value),
    /// Stored text that failed to parse, passed through unchanged.
    Raw(String),
}

impl ScanRecord {
    /// Decodes persisted text, degrading to `Raw` instead of failing.
    pub fn from_stored(raw: String) -> Self {
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Self::Parsed(value),
            Err(_) => Self::Raw(raw),
        }
    }

    /// Returns the document when this entry holds a JSON object.
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Parsed(Value::Object(document)) => Some(document),
            _ => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }
}

/// One `(key, record)` pair produced by a full scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanEntry {
    pub key: String,
    pub record: ScanRecord,
}

#[cfg(test)]
mod tests {
    use super::{decode_document, encode_document, DecodeError, Document, ScanRecord};
    use serde_json::json;

    #[test]
    fn empty_document_is_stored_as_empty_object() {
        let encoded = encode_document(&Document::new()).unwrap();
        assert_eq!(encoded, "{}");
        assert!(decode_document(&encoded).unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_non_object_json() {
        let err = decode_document("\"v1\"").unwrap_err();
        assert_eq!(err, DecodeError::NotAnObject("string"));
        assert!(err.message().contains("string"));
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let err = decode_document("{not json").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson(_)));
    }

    #[test]
    fn scan_record_passes_raw_text_through() {
        let record = ScanRecord::from_stored("plain text".to_string());
        assert!(record.is_raw());
        assert_eq!(serde_json::to_value(&record).unwrap(), json!("plain text"));

        let parsed = ScanRecord::from_stored("{\"a\":1}".to_string());
        assert_eq!(parsed.as_document().unwrap()["a"], json!(1));
    }
}
