//! Clock abstraction so time-dependent logic can be tested.
//!
//! The scheduler never reads the system clock directly; it is handed a
//! `TimeSource` at construction. Production code uses [`SystemClock`], tests
//! inject a [`ManualClock`] they can move at will.

use chrono::{DateTime, Utc};

/// Trait for reading the current instant.
pub trait TimeSource: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real-time implementation that uses the actual system clock.
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests.
#[cfg(any(test, feature = "testing-support"))]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(any(test, feature = "testing-support"))]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    /// Move the clock to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap() = instant;
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl TimeSource for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
