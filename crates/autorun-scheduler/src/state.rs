//! Persistent last-run state.
//!
//! The state file is a JSON object mapping automation ids to the RFC 3339
//! timestamp of their last successful run:
//!
//! ```json
//! { "nightly": "2024-01-01T09:00:00.000Z" }
//! ```
//!
//! Reads are forgiving: a missing or corrupt file is an empty state. Writes
//! go to a temporary file in the same directory which is then renamed over
//! the old file, so a crash mid-write leaves the previous state intact.
//!
//! Nothing coordinates between processes. Two runners pointed at the same
//! file race, and the last writer wins.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::SchedulerError;

/// Default location of the state file, relative to the working directory.
pub const DEFAULT_STATE_PATH: &str = ".automation-runner/state.json";

/// Automation id to last successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunState {
    entries: BTreeMap<String, String>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last successful run of `id`. Unparseable timestamps read as never run.
    pub fn last_run(&self, id: &str) -> Option<DateTime<Utc>> {
        let raw = self.entries.get(id)?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn record_run(&mut self, id: &str, at: DateTime<Utc>) {
        self.entries.insert(
            id.to_string(),
            at.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }

    pub fn raw(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse state from JSON, keeping only string-valued entries.
    fn from_json(text: &str) -> Option<Self> {
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(text).ok()?;
        let entries = raw
            .into_iter()
            .filter_map(|(id, value)| match value {
                serde_json::Value::String(ts) => Some((id, ts)),
                _ => None,
            })
            .collect();
        Some(Self { entries })
    }
}

/// Reads and writes [`RunState`] at a fixed path.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state. Never fails: absent or unparseable files give an empty state.
    pub fn load(&self) -> RunState {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file yet");
                return RunState::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable state file, starting empty");
                return RunState::new();
            }
        };

        match RunState::from_json(&text) {
            Some(state) => state,
            None => {
                warn!(path = %self.path.display(), "corrupt state file, starting empty");
                RunState::new()
            }
        }
    }

    /// Atomically replace the state file, creating parent directories.
    pub fn save(&self, state: &RunState) -> Result<(), SchedulerError> {
        let io_err = |source| SchedulerError::StateIo {
            path: self.path.clone(),
            source,
        };

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(io_err)?;

        let mut json = serde_json::to_string_pretty(state)?;
        json.push('\n');

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        debug!(path = %self.path.display(), entries = state.len(), "saved state");
        Ok(())
    }
}
