//! Shared helpers for integration tests.

use std::sync::{Arc, Mutex};
use userstore_core::{OperationEvent, OperationPhase, OperationSink};

/// Sink that keeps every event in memory for assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<OperationEvent>>,
}

impl RecordingSink {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<OperationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<(&'static str, OperationPhase)> {
        self.events()
            .into_iter()
            .map(|event| (event.operation, event.phase))
            .collect()
    }
}

impl OperationSink for RecordingSink {
    fn record(&self, event: &OperationEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
