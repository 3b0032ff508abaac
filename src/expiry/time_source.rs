//! Time Sources
//!
//! Millisecond clocks consulted by the store for creation, access and
//! expiration instants. Injectable so expiry can be tested deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Process-wide origin for [`SystemTimeSource`]
static PROCESS_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// A monotonic millisecond clock
pub trait TimeSource: Send + Sync {
    /// Current time in milliseconds
    fn now_millis(&self) -> u64;
}

/// Monotonic clock relative to the first time any store read it
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    #[inline]
    fn now_millis(&self) -> u64 {
        PROCESS_EPOCH.elapsed().as_millis() as u64
    }
}

/// Manually driven clock
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicU64,
}

impl ManualTimeSource {
    /// Create a clock reading `start_millis`
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Set the clock to an absolute reading
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    #[inline]
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_is_monotonic() {
        let clock = SystemTimeSource;
        let first = clock.now_millis();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.now_millis() >= first + 5);
    }

    #[test]
    fn test_manual_time_source() {
        let clock = ManualTimeSource::new(100);
        assert_eq!(clock.now_millis(), 100);

        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now_millis(), 350);

        clock.set(10);
        assert_eq!(clock.now_millis(), 10);
    }
}
