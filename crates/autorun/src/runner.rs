//! Run modes of the `autorun` binary.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use autorun_scheduler::{Diagnostic, Discovery, Engine, HandlerConfig, PassReport, RunMode, discover};
use miette::{IntoDiagnostic, Result};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// What one invocation of the binary does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Print discovered automations, run nothing.
    List,
    /// One pass over every active automation.
    Once,
    /// One pass over the automations due now.
    DueNow,
    /// Due passes forever, one immediately and then every `interval`.
    Tick { interval: Duration },
}

#[derive(Debug, Clone)]
pub struct Options {
    pub roots: Vec<PathBuf>,
    pub types: Vec<String>,
    pub mode: Mode,
    pub dry_run: bool,
}

pub async fn run(options: &Options, engine: &Engine, out: &mut impl Write) -> Result<()> {
    match options.mode {
        Mode::List => list(&load(options), out),
        Mode::Once => pass(options, engine, RunMode::All).await.map(|_| ()),
        Mode::DueNow => pass(options, engine, RunMode::Due).await.map(|_| ()),
        Mode::Tick { interval } => tick(options, engine, interval).await,
    }
}

/// Discover automations and log whatever discovery skipped.
fn load(options: &Options) -> Discovery {
    let discovery = discover(&options.roots, &options.types);
    for diagnostic in discovery.diagnostics.iter() {
        // Duplicate ids were already warned about during discovery.
        if !matches!(diagnostic, Diagnostic::DuplicateId { .. }) {
            debug!(%diagnostic, "discovery skipped input");
        }
    }
    info!(
        count = discovery.automations.len(),
        roots = options.roots.len(),
        "discovered automations"
    );
    discovery
}

/// Write one line per automation, each working directory indented below it.
///
/// Automations whose handler fields would not resolve are listed anyway,
/// with a warning.
fn list(discovery: &Discovery, out: &mut impl Write) -> Result<()> {
    for automation in &discovery.automations {
        if let Err(e) = HandlerConfig::resolve(automation) {
            warn!(id = %automation.id, error = %e, "automation would fail to run");
        }
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            automation.id,
            automation.kind,
            automation.status,
            automation.rrule.as_deref().unwrap_or("-"),
            automation.source_path.display()
        )
        .into_diagnostic()?;
        for dir in &automation.working_directories {
            writeln!(out, "    {}", dir.display()).into_diagnostic()?;
        }
    }
    out.flush().into_diagnostic()
}

/// Discover and run one pass.
///
/// Definitions are re-read on every pass so edits are picked up by a
/// running tick loop.
async fn pass(options: &Options, engine: &Engine, mode: RunMode) -> Result<PassReport> {
    let discovery = load(options);
    let report = engine
        .run(&discovery.automations, mode, options.dry_run)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    if report.failed() > 0 {
        warn!(
            failed = report.failed(),
            succeeded = report.succeeded(),
            "some automations failed"
        );
    }
    Ok(report)
}

async fn tick(options: &Options, engine: &Engine, period: Duration) -> Result<()> {
    info!(
        interval_secs = period.as_secs(),
        dry_run = options.dry_run,
        state = %engine.state_store().path().display(),
        "starting tick loop"
    );

    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("received shutdown signal");
                return Ok(());
            }
            _ = timer.tick() => {}
        }

        // A pass is never interrupted; Ctrl-C is honored between passes.
        pass(options, engine, RunMode::Due).await?;
    }
}
