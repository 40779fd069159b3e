//! Running external processes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::HandlerError;

/// A process to start in a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// A command line interpreted by the platform shell.
    Shell { command: String, cwd: PathBuf },
    /// A program started directly with arguments.
    Program {
        program: String,
        args: Vec<String>,
        cwd: PathBuf,
    },
}

impl Invocation {
    pub fn cwd(&self) -> &Path {
        match self {
            Invocation::Shell { cwd, .. } | Invocation::Program { cwd, .. } => cwd,
        }
    }

    fn to_command(&self) -> Command {
        let mut command = match self {
            Invocation::Shell { command, .. } => {
                let mut shell = if cfg!(windows) {
                    let mut c = Command::new("cmd");
                    c.arg("/C");
                    c
                } else {
                    let mut c = Command::new("sh");
                    c.arg("-c");
                    c
                };
                shell.arg(command);
                shell
            }
            Invocation::Program { program, args, .. } => {
                let mut c = Command::new(program);
                c.args(args);
                c
            }
        };
        command.current_dir(self.cwd()).kill_on_drop(true);
        command
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Shell { command, .. } => write!(f, "{}", command),
            Invocation::Program { program, args, .. } => {
                write!(f, "{}", program)?;
                for arg in args {
                    if arg.is_empty() || arg.contains(char::is_whitespace) {
                        write!(f, " {:?}", arg)?;
                    } else {
                        write!(f, " {}", arg)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, or `None` if the process was killed by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into an error.
    pub fn into_result(self) -> Result<(), HandlerError> {
        if self.success() {
            Ok(())
        } else {
            Err(HandlerError::ExitStatus(self.code))
        }
    }
}

/// Starts processes and waits for them to exit.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<ExitOutcome, HandlerError>;
}

/// Runs processes for real, inheriting stdio.
///
/// Without a timeout a hung process blocks the runner indefinitely.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill processes that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ExitOutcome, HandlerError> {
        debug!(cwd = %invocation.cwd().display(), command = %invocation, "spawning process");
        let mut child = invocation.to_command().spawn()?;

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(HandlerError::Timeout(limit.as_secs()));
                }
            },
            None => child.wait().await?,
        };

        Ok(ExitOutcome {
            code: status.code(),
        })
    }
}
