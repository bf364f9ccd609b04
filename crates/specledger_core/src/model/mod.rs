//! Record shapes persisted in the world-state namespace.
//!
//! # Responsibility
//! - Define the opaque JSON document stored under each key.
//! - Define the typed test-spec projection and its fixed seed set.
//! - Define the per-entry shape produced by full-namespace scans.
//!
//! # Invariants
//! - A stored document is always a JSON object (possibly empty).
//! - Typed projections convert to and from `Document` without loss.

pub mod document;
pub mod test_spec;
