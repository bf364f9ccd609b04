//! Record store contract and persistence backends.
//!
//! # Responsibility
//! - Define the capability interface the contract facade depends on.
//! - Provide a SQLite backend and an in-memory backend with identical semantics.
//!
//! # Invariants
//! - A failing operation leaves stored state unchanged.
//! - Writes to one key are totally ordered; `set_field` never loses updates.
//! - Scans visit keys in ascending byte order.

pub mod memory_repo;
pub mod record_repo;
pub mod sqlite_repo;
