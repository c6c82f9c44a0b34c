//! Time sources for session expiry.
//!
//! All session timestamps are epoch milliseconds. Components take an
//! `Arc<dyn Clock>` so tests can drive expiry and refresh with a
//! `ManualClock` instead of waiting on the wall clock.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{Duration, Utc};

pub trait Clock: Send + Sync {
    /// Current time in epoch milliseconds
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::seconds(2));
        assert_eq!(clock.now_millis(), 3_000);

        clock.set(10);
        assert_eq!(clock.now_millis(), 10);
    }

    #[test]
    fn test_system_clock_is_recent() {
        let before = Utc::now().timestamp_millis();
        let now = SystemClock.now_millis();
        assert!(now >= before);
    }
}
