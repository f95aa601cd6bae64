//! Injectable wall-clock time.
//!
//! Components that stamp or age data take an `Arc<dyn Clock>` instead of
//! calling [`SystemTime::now`] directly, so tests can pin and move time.

use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A manually driven clock for tests.
#[derive(Debug)]
pub struct MockClock {
    now: RwLock<SystemTime>,
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    pub fn with_time(time: SystemTime) -> Self {
        Self {
            now: RwLock::new(time),
        }
    }

    /// Creates a clock pinned `secs` seconds after the unix epoch.
    pub fn at_unix_secs(secs: u64) -> Self {
        Self::with_time(UNIX_EPOCH + Duration::from_secs(secs))
    }

    pub fn new() -> Self {
        Self::with_time(SystemTime::now())
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += duration;
    }

    pub fn set_time(&self, time: SystemTime) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_advance_mock_clock() {
        // given
        let clock = MockClock::at_unix_secs(100);

        // when
        clock.advance(Duration::from_secs(5));

        // then
        assert_eq!(clock.now(), UNIX_EPOCH + Duration::from_secs(105));
    }

    #[test]
    fn should_set_mock_clock_time() {
        // given
        let clock = MockClock::at_unix_secs(100);

        // when
        clock.set_time(UNIX_EPOCH);

        // then
        assert_eq!(clock.now(), UNIX_EPOCH);
    }
}
