//! Transaction processor state machine.

/// Pipeline implementation and retry loop.
mod pipeline;
/// Processor states and errors.
mod types;

pub use pipeline::TransactionProcessor;
pub use types::{ErrorCategory, ProcessorState, TransactionProcessorError};
