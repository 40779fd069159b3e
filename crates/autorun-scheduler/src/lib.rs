//! File-defined automation scheduler.
//!
//! This crate provides:
//! - A lenient parser for `automation.<ext>` definition files
//! - Recurrence rules (`FREQ=DAILY;BYHOUR=9`) evaluated against wall-clock time
//! - Recursive discovery of definitions under root directories
//! - A JSON state file of last successful runs, replaced atomically
//! - An engine that dispatches automations to `command`, `runbook` and
//!   `prompt` handlers in each of their working directories

pub mod clock;
pub mod definition;
pub mod diagnostics;
pub mod discovery;
pub mod engine;
mod error;
pub mod handlers;
pub mod process;
pub mod rrule;
pub mod state;
mod types;

pub use clock::{Clock, FakeClock, SystemClock};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use discovery::{Discovery, discover};
pub use engine::{Engine, Outcome, PassReport, RunMode, SkipReason};
pub use error::{ConfigError, HandlerError, SchedulerError};
pub use handlers::{Handler, HandlerRegistry, RunContext};
pub use process::{ExitOutcome, Invocation, ProcessRunner, SystemRunner};
pub use rrule::{Frequency, RecurrenceRule};
pub use state::{DEFAULT_STATE_PATH, RunState, StateStore};
pub use types::{
    ACTIVE_STATUS, Automation, CommandConfig, DEFAULT_RUNBOOK_TOOL, HandlerConfig, PromptConfig,
    RunbookConfig,
};
