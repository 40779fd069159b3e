//! Error types for the scheduler.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a scheduler invocation.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The state directory or state file could not be written.
    #[error("failed to write state file {path}: {source}")]
    StateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The run state could not be serialized.
    #[error("failed to serialize run state: {0}")]
    StateEncode(#[from] serde_json::Error),
}

/// A handler-specific field is missing or has the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required field is absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but not of the expected type.
    #[error("field `{field}` must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    /// The automation type has no typed configuration.
    #[error("unsupported automation type: {0}")]
    UnsupportedType(String),
}

/// Errors from running an automation in one working directory.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Invalid handler configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// No handler is registered for the automation type.
    #[error("no handler registered for type `{0}`")]
    UnknownType(String),

    /// The external process could not be started.
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),

    /// The external process exited unsuccessfully.
    #[error("process exited with {}", describe_exit(.0))]
    ExitStatus(Option<i32>),

    /// The external process exceeded the configured timeout.
    #[error("process timed out after {0}s")]
    Timeout(u64),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}
