//! Repository facades.
//!
//! # Responsibility
//! - Expose the public, stable operation set for each entity.
//! - Hide DAO and connection details from the rest of the application.
//!
//! # Invariants
//! - Facades only delegate; every call goes through `DbOperations`.

pub mod user_repo;
