//! Test helpers shared by the unit tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::collaborators::CollaboratorError;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};

/// Records every command and replays queued responses
///
/// Commands without a queued response succeed with empty output.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    responses: Mutex<VecDeque<Result<CommandOutput, CollaboratorError>>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the response for the next command
    pub fn respond(&self, response: Result<CommandOutput, CollaboratorError>) -> &Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// Recorded commands rendered as command lines
    pub fn command_lines(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CollaboratorError> {
        self.calls.lock().unwrap().push(command.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CommandOutput::ok("")))
    }
}
