//! Log buffer service
//!
//! Collects the log entries of a single run. The orchestrator writes to the
//! buffer as stages progress and drains it into the run report at the end.

use conveyor_core::domain::{LogEntry, LogLevel};
use std::sync::{Arc, Mutex};

/// Service for collecting run log entries
pub trait LogBufferService: Send + Sync {
    fn add_entry(&self, entry: LogEntry);

    /// Returns all buffered entries and clears the buffer
    fn drain(&self) -> Vec<LogEntry>;

    fn info(&self, stage: Option<&str>, message: String) {
        self.add_entry(LogEntry::new(LogLevel::Info, stage, message));
    }

    fn warn(&self, stage: Option<&str>, message: String) {
        self.add_entry(LogEntry::new(LogLevel::Warning, stage, message));
    }

    fn error(&self, stage: Option<&str>, message: String) {
        self.add_entry(LogEntry::new(LogLevel::Error, stage, message));
    }
}

/// In-memory implementation of LogBufferService
///
/// Clones share the same buffer.
#[derive(Clone, Default)]
pub struct InMemoryLogBuffer {
    buffer: Arc<Mutex<Vec<LogEntry>>>,
}

impl InMemoryLogBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogBufferService for InMemoryLogBuffer {
    fn add_entry(&self, entry: LogEntry) {
        // A poisoned buffer still holds every entry pushed before the panic
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push(entry);
    }

    fn drain(&self) -> Vec<LogEntry> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.drain(..).collect()
    }
}
