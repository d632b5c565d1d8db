//! Injected time source.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Supplies the current time. Injected everywhere a timestamp is taken so
/// time-dependent behavior (pick delays, lock freshness) stays testable.
pub trait TimeService: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeService;

impl TimeService for SystemTimeService {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed, manually advanced time source for tests.
#[derive(Debug)]
pub struct FixedTimeService {
    now: Mutex<DateTime<Utc>>,
}

impl FixedTimeService {
    /// Creates a fixed time source starting at the given instant.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Creates a fixed time source starting now.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Moves the clock forward.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += duration;
    }

    /// Sets the clock to a specific instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap() = instant;
    }
}

impl Default for FixedTimeService {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeService for FixedTimeService {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
