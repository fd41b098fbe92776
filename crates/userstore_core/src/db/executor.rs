//! Background query execution context.
//!
//! # Responsibility
//! - Own one SQLite connection on a dedicated worker thread.
//! - Run queued jobs in FIFO order and hand results back to async callers.
//! - Feed the update, commit and rollback hooks into the invalidation tracker.
//!
//! # Invariants
//! - Callers never touch the connection directly; all access is a queued job.
//! - A job whose caller has already gone away is skipped, not executed.
//! - A panicking job does not take the worker down.
//! - A job's committed changes are broadcast before its caller is answered.
//! - No transaction stays open between jobs.

use super::invalidation::InvalidationTracker;
use super::{DbError, DbResult};
use log::{debug, error, warn};
use rusqlite::hooks::Action;
use rusqlite::Connection;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Answers the caller once the job's changes are published.
type Reply = Box<dyn FnOnce() + Send + 'static>;
/// Job sent to the worker. `None` means the caller was gone and nothing ran.
type Job = Box<dyn FnOnce(&mut Connection) -> Option<Reply> + Send + 'static>;

/// Handle to the serial worker queue. Cloning shares the same worker.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    sender: mpsc::Sender<Job>,
    name: Arc<str>,
}

impl QueryExecutor {
    /// Moves `conn` onto a new worker thread named `name`.
    ///
    /// The worker stops once every handle clone has been dropped.
    pub fn spawn(conn: Connection, tracker: InvalidationTracker, name: &str) -> DbResult<Self> {
        install_hooks(&conn, &tracker);

        let (sender, receiver) = mpsc::channel::<Job>();
        let worker_name = name.to_string();
        std::thread::Builder::new()
            .name(worker_name.clone())
            .spawn(move || run_worker(conn, receiver, tracker, worker_name))
            .map_err(|err| {
                error!(
                    "event=db_executor module=db status=error error_code=spawn_failed error={err}"
                );
                DbError::ExecutorClosed
            })?;

        Ok(Self {
            sender,
            name: Arc::from(name),
        })
    }

    /// Worker thread name, used as the execution-context label in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues `job` on the worker and waits for its result.
    ///
    /// Tables changed by transactions the job committed are broadcast before
    /// this returns, whether the job itself returned `Ok` or `Err`. Worker
    /// failures surface as `DbError::ExecutorClosed` or `DbError::JobAborted`
    /// converted into `E`.
    pub async fn run<T, E, F>(&self, job: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let worker = Arc::clone(&self.name);
        let boxed: Job = Box::new(move |conn| {
            if tx.is_closed() {
                return None;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(conn)));
            if outcome.is_err() {
                error!(
                    "event=db_executor module=db status=error worker={worker} error_code=job_panicked"
                );
            }
            // After a panic the reply only drops `tx`; the caller sees `JobAborted`.
            let reply: Reply = Box::new(move || {
                if let Ok(result) = outcome {
                    let _ = tx.send(result);
                }
            });
            Some(reply)
        });

        if self.sender.send(boxed).is_err() {
            return Err(DbError::ExecutorClosed.into());
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(DbError::JobAborted.into()),
        }
    }
}

fn install_hooks(conn: &Connection, tracker: &InvalidationTracker) {
    let on_update = tracker.clone();
    conn.update_hook(Some(
        move |_action: Action, _db: &str, table: &str, _rowid: i64| on_update.mark(table),
    ));
    let on_commit = tracker.clone();
    conn.commit_hook(Some(move || {
        on_commit.commit();
        // `false` lets the commit proceed.
        false
    }));
    let on_rollback = tracker.clone();
    conn.rollback_hook(Some(move || on_rollback.rollback()));
}

fn run_worker(
    mut conn: Connection,
    jobs: mpsc::Receiver<Job>,
    tracker: InvalidationTracker,
    name: String,
) {
    debug!("event=db_executor module=db status=start worker={name}");
    while let Ok(job) = jobs.recv() {
        let Some(reply) = job(&mut conn) else {
            continue;
        };
        close_open_transaction(&conn, &name);
        tracker.finish_job();
        reply();
    }
    debug!("event=db_executor module=db status=stopped worker={name}");
}

/// Rolls back a transaction a job began but never finished.
fn close_open_transaction(conn: &Connection, name: &str) {
    if conn.is_autocommit() {
        return;
    }
    warn!("event=db_executor module=db status=rollback worker={name} error_code=open_transaction");
    if let Err(err) = conn.execute_batch("ROLLBACK;") {
        error!(
            "event=db_executor module=db status=error worker={name} error_code=rollback_failed error={err}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::QueryExecutor;
    use crate::db::invalidation::InvalidationTracker;
    use crate::db::{open_db_in_memory, DbError};
    use futures::FutureExt;
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn executor() -> (QueryExecutor, InvalidationTracker) {
        let tracker = InvalidationTracker::new();
        let conn = open_db_in_memory().expect("open in-memory db");
        let executor =
            QueryExecutor::spawn(conn, tracker.clone(), "executor-test").expect("spawn worker");
        (executor, tracker)
    }

    #[tokio::test]
    async fn runs_job_off_the_calling_thread() {
        let (executor, _) = executor();
        let caller = std::thread::current().id();

        let worker = executor
            .run(|_conn: &mut Connection| Ok::<_, DbError>(std::thread::current().id()))
            .await
            .unwrap();

        assert_ne!(worker, caller);
        assert_eq!(executor.name(), "executor-test");
    }

    #[tokio::test]
    async fn committed_write_is_broadcast_before_the_caller_resumes() {
        let (executor, tracker) = executor();
        let mut rx = tracker.subscribe();

        for _ in 0..20 {
            executor
                .run(|conn: &mut Connection| {
                    conn.execute("INSERT INTO users (first_name) VALUES ('y')", [])?;
                    Ok::<_, DbError>(())
                })
                .await
                .unwrap();
            assert_eq!(&*rx.try_recv().unwrap(), "users");
        }
    }

    #[tokio::test]
    async fn autocommit_write_is_broadcast_even_when_job_fails() {
        let (executor, tracker) = executor();
        let mut rx = tracker.subscribe();

        let result = executor
            .run(|conn: &mut Connection| {
                conn.execute("INSERT INTO users (first_name) VALUES ('x')", [])?;
                Err::<(), DbError>(DbError::JobAborted)
            })
            .await;
        assert!(matches!(result, Err(DbError::JobAborted)));
        assert_eq!(&*rx.try_recv().unwrap(), "users");
    }

    #[tokio::test]
    async fn rolled_back_transaction_is_not_broadcast() {
        let (executor, tracker) = executor();
        let mut rx = tracker.subscribe();

        let count = executor
            .run(|conn: &mut Connection| {
                let tx = conn.transaction()?;
                tx.execute("INSERT INTO users (first_name) VALUES ('x')", [])?;
                tx.rollback()?;
                conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get::<_, i64>(0))
                    .map_err(DbError::from)
            })
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn transaction_left_open_by_a_job_is_rolled_back() {
        let (executor, tracker) = executor();
        let mut rx = tracker.subscribe();

        executor
            .run(|conn: &mut Connection| {
                conn.execute_batch("BEGIN; INSERT INTO users (first_name) VALUES ('x');")?;
                Ok::<_, DbError>(())
            })
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());

        let (autocommit, count) = executor
            .run(|conn: &mut Connection| {
                let count =
                    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get::<_, i64>(0))?;
                Ok::<_, DbError>((conn.is_autocommit(), count))
            })
            .await
            .unwrap();
        assert!(autocommit);
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn panicking_job_is_aborted_and_worker_survives() {
        let (executor, _) = executor();

        let result = executor
            .run(|_conn: &mut Connection| -> Result<(), DbError> { panic!("boom") })
            .await;
        assert!(matches!(result, Err(DbError::JobAborted)));

        let value = executor
            .run(|_conn: &mut Connection| Ok::<_, DbError>(7))
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn dropped_caller_skips_queued_job() {
        let (executor, _) = executor();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let ran = Arc::new(AtomicBool::new(false));

        let mut blocker = Box::pin(executor.run(move |_conn: &mut Connection| {
            release_rx.recv().expect("release signal");
            Ok::<_, DbError>(())
        }));
        assert!((&mut blocker).now_or_never().is_none());

        let flag = Arc::clone(&ran);
        let skipped = executor
            .run(move |_conn: &mut Connection| {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, DbError>(())
            })
            .now_or_never();
        assert!(skipped.is_none());

        release_tx.send(()).unwrap();
        blocker.await.unwrap();
        executor
            .run(|_conn: &mut Connection| Ok::<_, DbError>(()))
            .await
            .unwrap();

        assert!(!ran.load(Ordering::SeqCst));
    }
}
