//! Wall-clock abstraction so window arithmetic can be driven from tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> SystemTime;

    /// Whole seconds since the Unix epoch; times before the epoch read as 0.
    fn unix_secs(&self) -> u64 {
        self.now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Clock backed by `SystemTime::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually driven clock for tests and simulations.
///
/// Millisecond resolution, starting at a fixed point after the epoch.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Start at `secs` seconds after the Unix epoch.
    pub fn at_unix_secs(secs: u64) -> Self {
        Self {
            millis: AtomicU64::new(secs.saturating_mul(1000)),
        }
    }

    /// Jump to an absolute point in time.
    pub fn set(&self, time: SystemTime) {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let delta = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        let previous = self.millis.fetch_add(delta, Ordering::SeqCst);
        if previous.checked_add(delta).is_none() {
            self.millis.store(u64::MAX, Ordering::SeqCst);
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_unix_secs(0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.unix_secs() > 1_600_000_000);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::at_unix_secs(120);
        assert_eq!(clock.unix_secs(), 120);

        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.unix_secs(), 121);
        assert_eq!(
            clock.now(),
            UNIX_EPOCH + Duration::from_millis(121_500)
        );
    }

    #[test]
    fn test_manual_clock_advance_saturates() {
        let clock = ManualClock::at_unix_secs(10);
        clock.advance(Duration::MAX);
        assert_eq!(clock.millis.load(Ordering::SeqCst), u64::MAX);

        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.millis.load(Ordering::SeqCst), u64::MAX);
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::default();
        clock.set(UNIX_EPOCH + Duration::from_secs(3600));
        assert_eq!(clock.unix_secs(), 3600);
    }
}
