//! External command execution
//!
//! Every collaborator talks to its tool through a [`CommandRunner`]. Commands
//! are structured values (program plus argument vector) and are never passed
//! through a shell, so arguments need no quoting or escaping.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::collaborators::CollaboratorError;

/// Lines of output kept in error details
const DETAIL_LINES: usize = 20;

/// A command to execute
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Written to the child's stdin, then stdin is closed
    pub stdin: Option<String>,
    pub cwd: Option<String>,
    /// Overrides the runner's default timeout
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Program and arguments, for logs and error messages
///
/// Environment values and stdin are never printed.
impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last lines of stderr, or of stdout when stderr is empty
    pub fn detail(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        tail(source, DETAIL_LINES)
    }

    /// Turns a non-zero exit into [`CollaboratorError::CommandFailed`]
    pub fn check(self, command: &CommandSpec) -> Result<CommandOutput, CollaboratorError> {
        if self.success() {
            Ok(self)
        } else {
            Err(CollaboratorError::CommandFailed {
                command: command.to_string(),
                exit_code: self.exit_code,
                detail: self.detail(),
            })
        }
    }
}

/// Last `lines` non-empty lines of `text`
pub fn tail(text: &str, lines: usize) -> String {
    let kept: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}

/// Executes structured commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs a command to completion
    ///
    /// A non-zero exit code is not an error at this level; it is returned in
    /// the output for the caller to interpret. Errors are reserved for
    /// commands that could not be started or did not finish in time.
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CollaboratorError>;
}

/// Runs commands as child processes
pub struct ProcessRunner {
    default_timeout: Duration,
}

impl ProcessRunner {
    /// Creates a runner
    ///
    /// # Arguments
    /// * `default_timeout` - Upper bound for commands without their own timeout
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CollaboratorError> {
        debug!("Executing: {}", spec);

        let mut command = tokio::process::Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout kills the child
            .kill_on_drop(true);

        for (key, value) in &spec.env {
            command.env(key, value);
        }
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let spawn_error = |e: std::io::Error| CollaboratorError::Spawn {
            program: spec.program.clone(),
            message: e.to_string(),
        };

        let mut child = command.spawn().map_err(spawn_error)?;

        if let Some(input) = &spec.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input.as_bytes())
                    .await
                    .map_err(spawn_error)?;
            }
        }

        let timeout = spec.timeout.unwrap_or(self.default_timeout);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(spawn_error)?,
            Err(_) => {
                warn!("Command timed out after {:?}: {}", timeout, spec);
                return Err(CollaboratorError::Timeout {
                    operation: spec.to_string(),
                    after_secs: timeout.as_secs(),
                });
            }
        };

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if result.success() {
            debug!(
                "Command completed: exit_code=0, stdout_len={}, stderr_len={}",
                result.stdout.len(),
                result.stderr.len()
            );
        } else {
            debug!(
                "Command failed: {} exit_code={} stderr='{}'",
                spec,
                result.exit_code,
                result.stderr.trim()
            );
        }

        Ok(result)
    }
}

/// Logs commands instead of running them
///
/// Every command succeeds with `true` on stdout, so status queries made by
/// the deployment strategies report an active deployment. Commands whose
/// output is parsed can be given a canned answer with [`answer`](Self::answer).
#[derive(Debug, Default)]
pub struct DryRunRunner {
    answers: Vec<(String, String)>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands that have `subcommand` among their arguments with `stdout`
    pub fn answer(mut self, subcommand: &str, stdout: &str) -> Self {
        self.answers.push((subcommand.to_string(), stdout.to_string()));
        self
    }
}

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CollaboratorError> {
        info!("[dry-run] {}", spec);

        let answer = self
            .answers
            .iter()
            .find(|(subcommand, _)| spec.args.iter().any(|arg| arg == subcommand))
            .map(|(_, stdout)| stdout.as_str())
            .unwrap_or("true\n");

        Ok(CommandOutput::ok(answer))
    }
}
