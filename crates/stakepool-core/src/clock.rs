//! Time sources
//!
//! Ledger operations take `now` as an explicit argument; a [`Clock`] is only
//! consulted once per operation by the layer that serializes access to a pool.

use crate::types::{Timestamp, DAY_SECS};
use parking_lot::Mutex;

/// Source of the current unix time in seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by `chrono::Utc`
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}

/// Manually driven clock for simulations and tests
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to an absolute time. Moving backwards is allowed for replays.
    pub fn set(&self, timestamp: Timestamp) {
        *self.now.lock() = timestamp;
    }

    /// Advance by `secs` seconds and return the new time
    pub fn advance(&self, secs: i64) -> Timestamp {
        let mut now = self.now.lock();
        *now += secs;
        *now
    }

    pub fn advance_days(&self, days: i64) -> Timestamp {
        self.advance(days * DAY_SECS)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
