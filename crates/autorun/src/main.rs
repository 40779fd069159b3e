//! autorun: run declarative automations on a schedule.
//!
//! Modes:
//! - default: one pass over the automations that are due now
//! - `--once`: one pass over every active automation, ignoring schedules
//! - `--tick`: a due pass immediately, then one every `--interval` seconds
//! - `--list`: print discovered automations without running anything

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use autorun_scheduler::{DEFAULT_RUNBOOK_TOOL, DEFAULT_STATE_PATH, Engine, HandlerRegistry, StateStore, SystemRunner};
use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod runner;

use runner::{Mode, Options};

/// Shortest accepted tick interval in seconds.
const MIN_INTERVAL_SECS: u64 = 10;

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

#[derive(Parser, Debug)]
#[command(name = "autorun")]
#[command(about = "Discover and run scheduled automations", long_about = None)]
struct Cli {
    /// Directory to search for automation definitions (repeatable)
    #[arg(long = "root", env = "AUTORUN_ROOT", default_value = ".")]
    roots: Vec<PathBuf>,

    /// Only consider automations of these types (comma-separated, repeatable)
    #[arg(long = "type", env = "AUTORUN_TYPE", value_delimiter = ',')]
    types: Vec<String>,

    /// List discovered automations and exit
    #[arg(long)]
    list: bool,

    /// Run every active automation once, ignoring schedules
    #[arg(long)]
    once: bool,

    /// Keep running due passes on a fixed interval
    #[arg(long)]
    tick: bool,

    /// Tick interval in seconds (minimum 10)
    #[arg(long, env = "AUTORUN_INTERVAL", default_value = "60")]
    interval: u64,

    /// Print intended actions without running them or touching state.
    /// Accepts "1", "true", "yes", "on" or "0", "false", "no", "off", "" (case-insensitive).
    #[arg(
        long,
        env = "AUTORUN_DRY_RUN",
        value_parser = parse_bool_env,
        default_value = "false",
        default_missing_value = "true",
        num_args = 0..=1
    )]
    dry_run: bool,

    /// State file location
    #[arg(long, env = "AUTORUN_STATE", default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,

    /// Kill any automation process running longer than this many seconds
    #[arg(long, env = "AUTORUN_TIMEOUT")]
    timeout: Option<u64>,

    /// Program used to execute runbook blocks
    #[arg(long, env = "AUTORUN_RUNBOOK_TOOL", default_value = DEFAULT_RUNBOOK_TOOL)]
    runbook_tool: String,
}

impl Cli {
    fn mode(&self) -> Mode {
        if self.list {
            Mode::List
        } else if self.once {
            Mode::Once
        } else if self.tick {
            Mode::Tick {
                interval: Duration::from_secs(self.interval.max(MIN_INTERVAL_SECS)),
            }
        } else {
            Mode::DueNow
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so listings and dry-run output stay clean on stdout.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "autorun=info,autorun_scheduler=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let process_runner = SystemRunner::new().with_timeout(cli.timeout.map(Duration::from_secs));
    let registry = HandlerRegistry::builtin_with_runbook_tool(Arc::new(process_runner), &cli.runbook_tool);
    let engine = Engine::new(registry, StateStore::new(&cli.state));

    let options = Options {
        roots: cli.roots.clone(),
        types: cli.types.clone(),
        mode: cli.mode(),
        dry_run: cli.dry_run,
    };

    runner::run(&options, &engine, &mut std::io::stdout()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("autorun").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.roots, vec![PathBuf::from(".")]);
        assert!(cli.types.is_empty());
        assert_eq!(cli.state, PathBuf::from(DEFAULT_STATE_PATH));
        assert_eq!(cli.runbook_tool, DEFAULT_RUNBOOK_TOOL);
        assert!(!cli.dry_run);
        assert_eq!(cli.mode(), Mode::DueNow);
    }

    #[test]
    fn test_repeatable_roots_and_types() {
        let cli = parse(&["--root", "a", "--root", "b", "--type", "command,prompt", "--type", "runbook"]);
        assert_eq!(cli.roots, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(cli.types, vec!["command", "prompt", "runbook"]);
    }

    #[test]
    fn test_mode_precedence() {
        assert_eq!(parse(&["--tick", "--once", "--list"]).mode(), Mode::List);
        assert_eq!(parse(&["--tick", "--once"]).mode(), Mode::Once);
        assert_eq!(
            parse(&["--tick"]).mode(),
            Mode::Tick {
                interval: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn test_interval_floor() {
        assert_eq!(
            parse(&["--tick", "--interval", "3"]).mode(),
            Mode::Tick {
                interval: Duration::from_secs(MIN_INTERVAL_SECS)
            }
        );
        assert_eq!(
            parse(&["--tick", "--interval", "120"]).mode(),
            Mode::Tick {
                interval: Duration::from_secs(120)
            }
        );
    }

    #[test]
    fn test_dry_run_flag() {
        assert!(parse(&["--dry-run"]).dry_run);
        assert!(parse(&["--dry-run=yes"]).dry_run);
        assert!(!parse(&["--dry-run=off"]).dry_run);
    }

    #[test]
    fn test_parse_bool_env() {
        assert_eq!(parse_bool_env("TRUE"), Ok(true));
        assert_eq!(parse_bool_env(""), Ok(false));
        assert!(parse_bool_env("maybe").is_err());
    }
}
