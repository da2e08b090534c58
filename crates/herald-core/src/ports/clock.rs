//! Clock port.
//!
//! Every "now" in the engine comes from here, so tests can pin time with
//! `FixedClock` and step it forward between sweeps.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and demos. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = after(*now, by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `at + by`, saturating at millisecond precision.
pub fn after(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
    at.checked_add_signed(chrono::Duration::milliseconds(millis))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `at - by`, saturating at millisecond precision.
pub fn before(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
    at.checked_sub_signed(chrono::Duration::milliseconds(millis))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
