//! Execution engine.
//!
//! A pass walks the automations in order, decides which ones to attempt,
//! dispatches each to its handler once per working directory, and records a
//! last-run timestamp for every automation that succeeded everywhere.
//! Everything runs sequentially: no two automations, and no two working
//! directories of one automation, ever run at the same time.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::HandlerError;
use crate::handlers::{HandlerRegistry, RunContext};
use crate::state::StateStore;
use crate::types::Automation;
use crate::SchedulerError;

/// Which automations a pass attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Every active automation, ignoring schedules.
    All,
    /// Active automations whose recurrence rule is due now.
    Due,
}

/// Why an automation was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Status is not `ACTIVE`.
    Inactive,
    /// No `rrule`, so never selected in due mode.
    Unscheduled,
    /// The rule does not match the current time.
    NotDue,
}

/// Result of attempting one automation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every working directory succeeded and state was updated.
    Succeeded,
    /// Every working directory succeeded in dry-run mode; state untouched.
    DryRun,
    /// At least one working directory failed; state untouched.
    Failed { reason: String },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::DryRun => write!(f, "dry-run"),
            Outcome::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Summary of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Attempted automations, in attempt order.
    pub attempts: Vec<(String, Outcome)>,
    pub skipped: Vec<(String, SkipReason)>,
}

impl PassReport {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Succeeded | Outcome::DryRun))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    pub fn outcome(&self, id: &str) -> Option<&Outcome> {
        self.attempts
            .iter()
            .find(|(attempted, _)| attempted == id)
            .map(|(_, outcome)| outcome)
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.attempts.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Runs passes over a set of automations.
pub struct Engine {
    registry: HandlerRegistry,
    state: StateStore,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(registry: HandlerRegistry, state: StateStore) -> Self {
        Self {
            registry,
            state,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state
    }

    /// Run one pass.
    ///
    /// State is re-read at the start of the pass and written immediately
    /// after each successful automation. Individual failures are logged and
    /// reported, never returned; only a failure to write the state file is.
    #[tracing::instrument(skip_all, fields(mode = ?mode, dry_run = dry_run, count = automations.len()))]
    pub async fn run(
        &self,
        automations: &[Automation],
        mode: RunMode,
        dry_run: bool,
    ) -> Result<PassReport, SchedulerError> {
        let mut state = self.state.load();
        let now = self.clock.now();
        let mut report = PassReport::default();

        for automation in automations {
            if !automation.is_active() {
                debug!(id = %automation.id, status = %automation.status, "skipping inactive automation");
                report.skipped.push((automation.id.clone(), SkipReason::Inactive));
                continue;
            }

            if mode == RunMode::Due {
                let Some(rule) = automation.recurrence() else {
                    report.skipped.push((automation.id.clone(), SkipReason::Unscheduled));
                    continue;
                };
                let last_run = state.last_run(&automation.id);
                if !rule.is_due(&now, last_run.as_ref()) {
                    report.skipped.push((automation.id.clone(), SkipReason::NotDue));
                    continue;
                }
            }

            let outcome = match self.execute(automation, dry_run).await {
                Ok(()) if dry_run => Outcome::DryRun,
                Ok(()) => {
                    state.record_run(&automation.id, self.clock.now().with_timezone(&Utc));
                    self.state.save(&state)?;
                    info!(id = %automation.id, "automation succeeded");
                    Outcome::Succeeded
                }
                Err(reason) => {
                    warn!(id = %automation.id, reason = %reason, "automation failed");
                    Outcome::Failed { reason }
                }
            };
            report.attempts.push((automation.id.clone(), outcome));
        }

        info!(
            attempted = report.attempts.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped.len(),
            "pass finished"
        );
        Ok(report)
    }

    /// Run the automation's handler in each working directory.
    ///
    /// Every directory is attempted even after a run failure; earlier
    /// successes are not rolled back. Configuration errors stop at the first
    /// directory.
    async fn execute(&self, automation: &Automation, dry_run: bool) -> Result<(), String> {
        let Some(handler) = self.registry.get(&automation.kind) else {
            let err = HandlerError::UnknownType(automation.kind.clone());
            warn!(id = %automation.id, kind = %automation.kind, "no handler for automation type");
            return Err(err.to_string());
        };

        info!(
            id = %automation.id,
            kind = %automation.kind,
            dirs = automation.working_directories.len(),
            "running automation"
        );

        let mut failures = Vec::new();
        for cwd in &automation.working_directories {
            let ctx = RunContext {
                automation,
                cwd,
                dry_run,
            };
            match handler.run(&ctx).await {
                Ok(()) => debug!(id = %automation.id, cwd = %cwd.display(), "directory succeeded"),
                Err(HandlerError::Config(e)) => {
                    warn!(id = %automation.id, error = %e, "invalid automation configuration");
                    failures.push(e.to_string());
                    break;
                }
                Err(e) => {
                    warn!(id = %automation.id, cwd = %cwd.display(), error = %e, "run failed");
                    failures.push(format!("{}: {}", cwd.display(), e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    }
}
