//! Entity models mapped to storage rows.
//!
//! # Responsibility
//! - Define in-memory record types independent of SQL details.
//!
//! # Invariants
//! - Every persisted entity is identified by a storage-generated id.

pub mod user;
