//! Type-specific automation handlers.
//!
//! Every automation `type` maps to a [`Handler`] in a [`HandlerRegistry`].
//! The engine calls the handler once per working directory.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::HandlerError;
use crate::process::{Invocation, ProcessRunner};
use crate::types::{Automation, CommandConfig, DEFAULT_RUNBOOK_TOOL, PromptConfig, RunbookConfig};

/// What a handler is asked to do.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub automation: &'a Automation,
    pub cwd: &'a Path,
    /// Print intended actions instead of performing them.
    pub dry_run: bool,
}

/// Executes one automation in one working directory.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn run(&self, ctx: &RunContext<'_>) -> Result<(), HandlerError>;
}

/// Dispatch table from automation type to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `command`, `runbook` and `prompt` handlers.
    pub fn builtin(runner: Arc<dyn ProcessRunner>) -> Self {
        Self::builtin_with_runbook_tool(runner, DEFAULT_RUNBOOK_TOOL)
    }

    pub fn builtin_with_runbook_tool(runner: Arc<dyn ProcessRunner>, runbook_tool: &str) -> Self {
        Self::new()
            .with("command", CommandHandler::new(Arc::clone(&runner)))
            .with(
                "runbook",
                RunbookHandler::new(Arc::clone(&runner), runbook_tool),
            )
            .with("prompt", PromptHandler::new(runner))
    }

    /// Register (or replace) the handler for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, handler: impl Handler + 'static) {
        self.handlers.insert(kind.into(), Arc::new(handler));
    }

    pub fn with(mut self, kind: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.register(kind, handler);
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds().collect::<Vec<_>>())
            .finish()
    }
}

/// Runs the `command` field through the shell.
pub struct CommandHandler {
    runner: Arc<dyn ProcessRunner>,
}

impl CommandHandler {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Handler for CommandHandler {
    async fn run(&self, ctx: &RunContext<'_>) -> Result<(), HandlerError> {
        let CommandConfig { command } = CommandConfig::from_automation(ctx.automation)?;

        if ctx.dry_run {
            println!("[dry-run] {} ({}): {}", ctx.automation.id, ctx.cwd.display(), command);
            return Ok(());
        }

        let invocation = Invocation::Shell {
            command,
            cwd: ctx.cwd.to_path_buf(),
        };
        self.runner.run(&invocation).await?.into_result()
    }
}

/// Runs a runbook block through the external runbook tool.
///
/// Invokes `<tool> run <runbook> --block <block>`, adding `--dry-run` in
/// dry-run mode so the tool can report what it would do.
pub struct RunbookHandler {
    runner: Arc<dyn ProcessRunner>,
    default_tool: String,
}

impl RunbookHandler {
    pub fn new(runner: Arc<dyn ProcessRunner>, default_tool: impl Into<String>) -> Self {
        Self {
            runner,
            default_tool: default_tool.into(),
        }
    }

    fn invocation(&self, config: RunbookConfig, ctx: &RunContext<'_>) -> Invocation {
        let mut args = vec![
            "run".to_string(),
            config.runbook.to_string_lossy().into_owned(),
            "--block".to_string(),
            config.block,
        ];
        if ctx.dry_run {
            args.push("--dry-run".to_string());
        }

        Invocation::Program {
            program: config.tool.unwrap_or_else(|| self.default_tool.clone()),
            args,
            cwd: ctx.cwd.to_path_buf(),
        }
    }
}

#[async_trait]
impl Handler for RunbookHandler {
    async fn run(&self, ctx: &RunContext<'_>) -> Result<(), HandlerError> {
        let invocation = self.invocation(RunbookConfig::from_automation(ctx.automation)?, ctx);

        if ctx.dry_run {
            println!("[dry-run] {} ({}): {}", ctx.automation.id, ctx.cwd.display(), invocation);
        }
        debug!(id = %ctx.automation.id, command = %invocation, "invoking runbook tool");
        self.runner.run(&invocation).await?.into_result()
    }
}

/// Hands the `prompt` field to the configured `runner` program.
///
/// Without a runner, or in dry-run mode, the prompt is only printed.
pub struct PromptHandler {
    runner: Arc<dyn ProcessRunner>,
}

impl PromptHandler {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Handler for PromptHandler {
    async fn run(&self, ctx: &RunContext<'_>) -> Result<(), HandlerError> {
        let PromptConfig { prompt, runner } = PromptConfig::from_automation(ctx.automation)?;

        let argv = match runner {
            Some(argv) if !ctx.dry_run => argv,
            _ => {
                let prefix = if ctx.dry_run { "[dry-run] " } else { "" };
                println!("{}{} ({}):", prefix, ctx.automation.id, ctx.cwd.display());
                println!("{}", prompt);
                if !ctx.dry_run {
                    info!(id = %ctx.automation.id, "no runner configured, prompt shown only");
                }
                return Ok(());
            }
        };

        let mut argv = argv.into_iter();
        let Some(program) = argv.next() else {
            return Ok(());
        };
        let mut args: Vec<String> = argv.collect();
        args.push(prompt);

        let invocation = Invocation::Program {
            program,
            args,
            cwd: ctx.cwd.to_path_buf(),
        };
        self.runner.run(&invocation).await?.into_result()
    }
}
