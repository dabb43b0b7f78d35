//! Deterministic time for tests
//!
//! ```
//! use std::time::Duration;
//!
//! use restline_common::testing::MockClock;
//! use restline_common::time::Clock;
//!
//! let clock = MockClock::at_millis(1_000);
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now_millis(), 6_000);
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::time::{Clock, Sleeper};

/// Manually driven wall clock. Clones share the same reading.
#[derive(Debug, Clone)]
pub struct MockClock {
    millis: Arc<Mutex<i64>>,
}

impl MockClock {
    /// Clock starting at the current real time.
    #[must_use]
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        Self::at_millis(now)
    }

    /// Clock starting at `millis` since the epoch.
    #[must_use]
    pub fn at_millis(millis: i64) -> Self {
        Self { millis: Arc::new(Mutex::new(millis)) }
    }

    /// Simulate time passing without waiting.
    pub fn advance(&self, duration: Duration) {
        let step = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        let mut millis = self.millis.lock();
        *millis = millis.saturating_add(step);
    }

    pub fn set_millis(&self, millis: i64) {
        *self.millis.lock() = millis;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn system_time(&self) -> SystemTime {
        let millis = u64::try_from(*self.millis.lock()).unwrap_or_default();
        UNIX_EPOCH + Duration::from_millis(millis)
    }

    fn now_millis(&self) -> i64 {
        *self.millis.lock()
    }
}

/// Sleeper that returns immediately and remembers every requested wait.
///
/// When linked to a [`MockClock`], each wait also advances that clock.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    waits: Arc<Mutex<Vec<Duration>>>,
    clock: Option<MockClock>,
}

impl RecordingSleeper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_clock(clock: MockClock) -> Self {
        Self { waits: Arc::default(), clock: Some(clock) }
    }

    /// Every wait requested so far, in order.
    #[must_use]
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().clone()
    }

    #[must_use]
    pub fn total(&self) -> Duration {
        self.waits.lock().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().push(duration);
        if let Some(clock) = &self.clock {
            clock.advance(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_reading() {
        let clock = MockClock::at_millis(10);
        let other = clock.clone();
        clock.advance(Duration::from_millis(5));
        assert_eq!(other.now_millis(), 15);

        other.set_millis(100);
        assert_eq!(clock.now_millis(), 100);
        assert_eq!(clock.system_time(), UNIX_EPOCH + Duration::from_millis(100));
    }

    #[tokio::test]
    async fn recording_sleeper_advances_linked_clock() {
        let clock = MockClock::at_millis(0);
        let sleeper = RecordingSleeper::with_clock(clock.clone());

        sleeper.sleep(Duration::from_millis(500)).await;
        sleeper.sleep(Duration::from_secs(2)).await;

        assert_eq!(sleeper.waits(), vec![Duration::from_millis(500), Duration::from_secs(2)]);
        assert_eq!(sleeper.total(), Duration::from_millis(2_500));
        assert_eq!(clock.now_millis(), 2_500);
    }
}
