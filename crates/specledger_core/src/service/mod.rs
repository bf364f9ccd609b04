//! Caller-facing contract operations.
//!
//! # Responsibility
//! - Translate dispatcher-level calls into record store operations.
//! - Keep callers decoupled from the storage backend in use.

pub mod spec_contract;
