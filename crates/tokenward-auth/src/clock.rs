//! Clocks used for token timestamps
//!
//! Token issuing and expiry checks read the time through [`Clock`] so tests
//! can move time forward without sleeping.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Represents a clock, which can tell the current time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time as a duration since the Unix epoch
    fn now(&self) -> Duration;
}

/// The system clock as provided by `std::time::SystemTime`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}

/// A manually driven clock with millisecond resolution
///
/// Clones share the same underlying time.
#[derive(Clone, Debug, Default)]
pub struct TestClock {
    millis: Arc<AtomicU64>,
}

impl TestClock {
    /// Creates a clock frozen at `now`
    pub fn at(now: Duration) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(now.as_millis() as u64)),
        }
    }

    /// Creates a clock frozen at the current system time
    pub fn starting_now() -> Self {
        Self::at(SystemClock.now())
    }

    /// Moves the clock forward
    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}
