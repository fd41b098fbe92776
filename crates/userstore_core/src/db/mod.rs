//! SQLite storage bootstrap, execution context and change tracking.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Apply schema migrations in deterministic order.
//! - Run queries on a dedicated background worker and broadcast table
//!   invalidations after successful writes.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.
//! - Exactly one worker owns a given connection.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod database;
pub mod executor;
pub mod invalidation;
pub mod migrations;
mod open;

pub use database::UserDatabase;
pub use executor::QueryExecutor;
pub use invalidation::InvalidationTracker;
pub use open::{open_db, open_db_in_memory, open_location};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// The worker thread is gone; no more jobs can run.
    ExecutorClosed,
    /// The worker dropped the job without producing a result.
    JobAborted,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::ExecutorClosed => write!(f, "database executor is closed"),
            Self::JobAborted => write!(f, "database job aborted before completion"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::ExecutorClosed | Self::JobAborted => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
