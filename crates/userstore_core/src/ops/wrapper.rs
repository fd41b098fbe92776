//! `DbOperations`: dispatch + observability decorator for DAO calls.
//!
//! # Responsibility
//! - `execute_write` / `execute_read`: suspend the caller while the operation
//!   runs on the worker, emitting call then success or failure.
//! - `execute_observe`: live snapshot stream re-queried on every change to
//!   the watched table.
//!
//! # Invariants
//! - Errors are returned as the same value the operation produced.
//! - No retries and no recovery.
//! - Observation failures are emitted as failure events and delivered to the
//!   subscriber as `Err` items; the subscription stays open.

use super::sink::{LogSink, OperationEvent, OperationPhase, OperationSink};
use crate::db::executor::QueryExecutor;
use crate::db::invalidation::InvalidationTracker;
use crate::db::DbError;
use crate::logging::sanitize_message;
use futures::stream::{self, BoxStream, StreamExt};
use rusqlite::Connection;
use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::{self, error::RecvError};

const MAX_LOGGED_CHARS: usize = 160;

/// Operation name plus optional write payload, for log correlation only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub payload: Option<String>,
}

impl OperationDescriptor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            payload: None,
        }
    }

    /// Attaches a sanitized, length-capped rendering of `payload`.
    pub fn with_payload(mut self, payload: &impl Debug) -> Self {
        self.payload = Some(sanitize_message(
            &format!("{payload:?}"),
            MAX_LOGGED_CHARS,
        ));
        self
    }
}

impl From<&'static str> for OperationDescriptor {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

/// Cross-cutting wrapper bound to one database handle.
#[derive(Clone)]
pub struct DbOperations {
    executor: QueryExecutor,
    tracker: InvalidationTracker,
    tag: &'static str,
    sink: Arc<dyn OperationSink>,
}

impl DbOperations {
    pub fn new(executor: QueryExecutor, tracker: InvalidationTracker, tag: &'static str) -> Self {
        Self {
            executor,
            tracker,
            tag,
            sink: Arc::new(LogSink),
        }
    }

    /// Replaces the default `LogSink`.
    pub fn with_sink(mut self, sink: Arc<dyn OperationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// Runs a write on the execution context. The operation's value is dropped.
    pub async fn execute_write<W, E, F>(
        &self,
        descriptor: impl Into<OperationDescriptor>,
        operation: F,
    ) -> Result<(), E>
    where
        F: FnOnce(&mut Connection) -> Result<W, E> + Send + 'static,
        W: Send + 'static,
        E: From<DbError> + Display + Send + 'static,
    {
        self.execute(descriptor.into(), operation).await.map(|_| ())
    }

    /// Runs a read on the execution context and returns its value unchanged.
    pub async fn execute_read<T, E, F>(
        &self,
        descriptor: impl Into<OperationDescriptor>,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + Display + Send + 'static,
    {
        self.execute(descriptor.into(), operation).await
    }

    /// Subscribes to `table` and re-runs `operation` after every committed
    /// change to it, starting with one initial snapshot.
    ///
    /// Dropping the stream ends the subscription.
    pub fn execute_observe<T, E, F>(
        &self,
        descriptor: impl Into<OperationDescriptor>,
        table: &'static str,
        operation: F,
    ) -> BoxStream<'static, Result<T, E>>
    where
        F: Fn(&mut Connection) -> Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: From<DbError> + Display + Send + 'static,
    {
        let descriptor = descriptor.into();
        // Subscribe before the first query so no change can slip between them.
        let receiver = self.tracker.subscribe();
        self.emit(&descriptor, OperationPhase::Call, None, None);

        let state = ObserveState {
            ops: self.clone(),
            descriptor,
            table,
            operation: Arc::new(operation),
            receiver,
            primed: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.primed && !wait_for_change(&mut state.receiver, state.table).await {
                return None;
            }
            state.primed = true;

            let operation = Arc::clone(&state.operation);
            let started_at = Instant::now();
            let result = state
                .ops
                .executor
                .run(move |conn: &mut Connection| operation(conn))
                .await;
            state.ops.report(&state.descriptor, started_at, &result);
            Some((result, state))
        })
        .boxed()
    }

    async fn execute<T, E, F>(&self, descriptor: OperationDescriptor, operation: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + Display + Send + 'static,
    {
        let started_at = Instant::now();
        self.emit(&descriptor, OperationPhase::Call, None, None);
        let result = self.executor.run(operation).await;
        self.report(&descriptor, started_at, &result);
        result
    }

    fn report<T, E: Display>(
        &self,
        descriptor: &OperationDescriptor,
        started_at: Instant,
        result: &Result<T, E>,
    ) {
        let duration_ms = Some(started_at.elapsed().as_millis());
        match result {
            Ok(_) => self.emit(descriptor, OperationPhase::Success, None, duration_ms),
            Err(err) => self.emit(
                descriptor,
                OperationPhase::Failure,
                Some(sanitize_message(&err.to_string(), MAX_LOGGED_CHARS)),
                duration_ms,
            ),
        }
    }

    fn emit(
        &self,
        descriptor: &OperationDescriptor,
        phase: OperationPhase,
        error: Option<String>,
        duration_ms: Option<u128>,
    ) {
        let payload = match phase {
            OperationPhase::Call => descriptor.payload.clone(),
            OperationPhase::Success | OperationPhase::Failure => None,
        };
        self.sink.record(&OperationEvent {
            tag: self.tag,
            operation: descriptor.name,
            phase,
            payload,
            error,
            duration_ms,
        });
    }
}

struct ObserveState<F> {
    ops: DbOperations,
    descriptor: OperationDescriptor,
    table: &'static str,
    operation: Arc<F>,
    receiver: broadcast::Receiver<Arc<str>>,
    primed: bool,
}

/// Waits for a broadcast naming `table`. Lag counts as a change.
async fn wait_for_change(receiver: &mut broadcast::Receiver<Arc<str>>, table: &str) -> bool {
    loop {
        match receiver.recv().await {
            Ok(changed) if &*changed == table => return true,
            Ok(_) => continue,
            Err(RecvError::Lagged(_)) => return true,
            Err(RecvError::Closed) => return false,
        }
    }
}
