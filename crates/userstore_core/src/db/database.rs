//! Owned database handle.
//!
//! # Responsibility
//! - Open and migrate one connection, then hand it to a `QueryExecutor`.
//! - Hand out operation wrappers bound to this handle.
//!
//! # Invariants
//! - One handle owns one connection; there is no process-global instance.
//! - Production and test handles resolve to different file names.

use super::executor::QueryExecutor;
use super::invalidation::InvalidationTracker;
use super::open::open_location;
use super::DbResult;
use crate::config::{DatabaseLocation, StoreConfig};
use crate::ops::DbOperations;
use log::info;
use std::path::{Path, PathBuf};

/// Explicitly owned database handle, injected wherever storage is needed.
#[derive(Debug, Clone)]
pub struct UserDatabase {
    executor: QueryExecutor,
    tracker: InvalidationTracker,
    location: DatabaseLocation,
}

impl UserDatabase {
    /// Opens the database described by `config`.
    pub fn open(config: &StoreConfig) -> DbResult<Self> {
        let conn = open_location(&config.location)?;
        let tracker = InvalidationTracker::new();
        let executor = QueryExecutor::spawn(conn, tracker.clone(), &config.worker_name)?;
        info!(
            "event=database_ready module=db status=ok mode={} worker={}",
            config.location.mode(),
            executor.name()
        );
        Ok(Self {
            executor,
            tracker,
            location: config.location.clone(),
        })
    }

    /// Opens a file database at `path`.
    pub fn open_file(path: impl Into<PathBuf>) -> DbResult<Self> {
        Self::open(&StoreConfig {
            location: DatabaseLocation::File(path.into()),
            ..StoreConfig::default()
        })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    /// Opens the test database file inside `dir`.
    pub fn open_for_tests(dir: impl AsRef<Path>) -> DbResult<Self> {
        Self::open(&StoreConfig::for_tests(dir))
    }

    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn invalidation_tracker(&self) -> &InvalidationTracker {
        &self.tracker
    }

    /// Returns an operation wrapper logging under `tag`.
    pub fn operations(&self, tag: &'static str) -> DbOperations {
        DbOperations::new(self.executor.clone(), self.tracker.clone(), tag)
    }
}
