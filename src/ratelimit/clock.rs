//! Time sources for token refill.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Source of timestamps used to refill buckets.
///
/// Implementations should be monotonic, but callers never assume it: a
/// timestamp earlier than a previous one is treated as zero elapsed time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually driven clock so refill behaviour can be tested without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Move the clock backward, simulating a skewed time source.
    ///
    /// Saturates at the earliest representable instant.
    pub fn rewind(&self, by: Duration) {
        let mut now = self.now.lock();
        if let Some(earlier) = now.checked_sub(by) {
            *now = earlier;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance_and_rewind() {
        let clock = ManualClock::new();
        let start = clock.now();

        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.now() - start, Duration::from_secs(3));

        clock.rewind(Duration::from_secs(1));
        assert_eq!(clock.now() - start, Duration::from_secs(2));
    }

    #[test]
    fn test_system_clock_is_non_decreasing() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
