//! Clock abstraction for testable due checks.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, TimeZone};

/// A source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Fake clock for testing with controllable time.
#[derive(Debug, Clone)]
pub struct FakeClock {
    current: Arc<Mutex<DateTime<Local>>>,
}

impl FakeClock {
    pub fn new<Tz: TimeZone>(at: DateTime<Tz>) -> Self {
        Self {
            current: Arc::new(Mutex::new(at.with_timezone(&Local))),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, by: chrono::Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }

    pub fn set<Tz: TimeZone>(&self, at: DateTime<Tz>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = at.with_timezone(&Local);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Local> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
