//! Table invalidation broadcasting.
//!
//! # Responsibility
//! - Collect table names touched by the SQLite update hook while a
//!   transaction is open.
//! - Promote them on commit, drop them on rollback.
//! - Broadcast each committed table once when the running job finishes.
//!
//! # Invariants
//! - Only committed changes are broadcast, whatever the job returned.
//! - Receivers that lag must treat the lag as "everything changed".

use log::debug;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct PendingTables {
    /// Touched by the open transaction.
    open: BTreeSet<String>,
    /// Committed during the current job, not yet broadcast.
    committed: BTreeSet<String>,
}

/// Fan-out of changed table names to live observers.
#[derive(Debug, Clone)]
pub struct InvalidationTracker {
    sender: broadcast::Sender<Arc<str>>,
    pending: Arc<Mutex<PendingTables>>,
}

impl Default for InvalidationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationTracker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            pending: Arc::new(Mutex::new(PendingTables::default())),
        }
    }

    /// Subscribes to future invalidations. Earlier broadcasts are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.sender.subscribe()
    }

    /// Records a table touched by the open transaction.
    ///
    /// Called from the SQLite update hook, so it must not touch the connection.
    pub fn mark(&self, table: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            if !pending.open.contains(table) {
                pending.open.insert(table.to_string());
            }
        }
    }

    /// Promotes the open transaction's tables. Called from the commit hook.
    pub fn commit(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            let open = std::mem::take(&mut pending.open);
            pending.committed.extend(open);
        }
    }

    /// Drops the open transaction's tables. Called from the rollback hook.
    pub fn rollback(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.open.clear();
        }
    }

    /// Ends the current job: broadcasts the tables committed while it ran.
    /// Returns the tables that were broadcast.
    pub fn finish_job(&self) -> Vec<String> {
        let (open, committed) = match self.pending.lock() {
            Ok(mut pending) => (
                std::mem::take(&mut pending.open),
                std::mem::take(&mut pending.committed),
            ),
            Err(_) => return Vec::new(),
        };
        if !open.is_empty() {
            debug!(
                "event=table_invalidation module=db status=discarded tables={}",
                open.len()
            );
        }

        let tables: Vec<String> = committed.into_iter().collect();
        for table in &tables {
            // No receivers is fine: nobody is observing.
            let _ = self.sender.send(Arc::from(table.as_str()));
            debug!("event=table_invalidation module=db status=ok table={table}");
        }
        tables
    }
}
