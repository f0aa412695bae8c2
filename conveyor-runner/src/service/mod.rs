//! Service layer
//!
//! Services shared by the orchestrator and its callers. They are
//! trait-based so tests can observe or replace them.

mod log_buffer;

pub use log_buffer::{InMemoryLogBuffer, LogBufferService};
