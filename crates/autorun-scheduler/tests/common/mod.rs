//! Shared helpers for scheduler integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use autorun_scheduler::definition::parse;
use autorun_scheduler::{Automation, ExitOutcome, HandlerError, Invocation, ProcessRunner};

type Script = Box<dyn Fn(&Invocation) -> i32 + Send + Sync>;

/// Records invocations and answers with scripted exit codes.
pub struct FakeRunner {
    calls: Mutex<Vec<Invocation>>,
    script: Script,
}

impl FakeRunner {
    /// Every invocation exits with `code`.
    pub fn exiting(code: i32) -> Arc<Self> {
        Self::scripted(move |_| code)
    }

    pub fn scripted(script: impl Fn(&Invocation) -> i32 + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            script: Box::new(script),
        })
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ExitOutcome, HandlerError> {
        self.calls.lock().unwrap().push(invocation.clone());
        Ok(ExitOutcome {
            code: Some((self.script)(invocation)),
        })
    }
}

/// Write `text` to `dir/rel`, creating parent directories.
pub fn write_file(dir: &Path, rel: &str, text: &str) -> PathBuf {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, text).unwrap();
    path
}

/// Build an automation as if its definition lived at `path`.
pub fn automation_at(path: &Path, text: &str) -> Automation {
    Automation::from_definition(path, parse(text))
}
