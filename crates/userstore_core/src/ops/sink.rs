//! Operation event model and sinks.

use log::{error, info};

/// Lifecycle point of one wrapped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPhase {
    Call,
    Success,
    Failure,
}

impl OperationPhase {
    pub fn status(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Success => "ok",
            Self::Failure => "error",
        }
    }
}

/// One event emitted by `DbOperations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationEvent {
    pub tag: &'static str,
    pub operation: &'static str,
    pub phase: OperationPhase,
    /// Rendered write payload, present on call events only.
    pub payload: Option<String>,
    /// Rendered error, present on failure events only.
    pub error: Option<String>,
    /// Set on success and failure events.
    pub duration_ms: Option<u128>,
}

/// Destination for operation events.
pub trait OperationSink: Send + Sync {
    fn record(&self, event: &OperationEvent);
}

/// Default sink writing metadata lines through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl OperationSink for LogSink {
    fn record(&self, event: &OperationEvent) {
        let line = format_event(event);
        match event.phase {
            OperationPhase::Failure => error!("{line}"),
            OperationPhase::Call | OperationPhase::Success => info!("{line}"),
        }
    }
}

fn format_event(event: &OperationEvent) -> String {
    let mut line = format!(
        "event=db_operation module=ops tag={} op={} status={}",
        event.tag,
        event.operation,
        event.phase.status()
    );
    if let Some(duration_ms) = event.duration_ms {
        line.push_str(&format!(" duration_ms={duration_ms}"));
    }
    if let Some(payload) = &event.payload {
        line.push_str(&format!(" payload={payload}"));
    }
    if let Some(error) = &event.error {
        line.push_str(&format!(" error={error}"));
    }
    line
}
