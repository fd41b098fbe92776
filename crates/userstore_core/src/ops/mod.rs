//! Operation wrapper around persistence calls.
//!
//! # Responsibility
//! - Run every DAO call on the database execution context.
//! - Emit call/success/failure events with a fixed tag.
//! - Return errors to the caller unchanged.
//!
//! # Invariants
//! - Each suspending operation emits exactly one call event followed by
//!   exactly one success or failure event.
//! - The wrapper holds no data state beyond its executor, tracker, tag and sink.

mod sink;
mod wrapper;

pub use sink::{LogSink, OperationEvent, OperationPhase, OperationSink};
pub use wrapper::{DbOperations, OperationDescriptor};
