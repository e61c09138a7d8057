//! Timestamp utilities
//!
//! The inventory service reports pick times as a bare time of day, so elapsed
//! time is always computed against a local wall clock. The clock is a trait so
//! cool-down rules can be tested at fixed instants.

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, Utc};
use std::sync::{Arc, Mutex};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Whole minutes elapsed between a reported time of day and `now`
///
/// A time of day later than `now` happened yesterday (overnight shifts), so
/// the result is never negative.
pub fn minutes_since_time_of_day(at: NaiveTime, now: NaiveDateTime) -> i64 {
    let mut occurred = now.date().and_time(at);
    if occurred > now {
        occurred -= chrono::Duration::days(1);
    }
    (now - occurred).num_minutes()
}

/// Source of local wall-clock time
pub trait Clock: Send + Sync {
    fn now_local(&self) -> NaiveDateTime;
}

/// Clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_local(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now_local(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
