//! Data-access interfaces and SQLite implementations.
//!
//! # Responsibility
//! - Define the narrow set of operations permitted against each table.
//! - Keep SQL and row mapping out of the repository facade.
//!
//! # Invariants
//! - Write paths validate entities before SQL mutations.
//! - Row translation is explicit code, never reflection.

pub mod user_dao;
