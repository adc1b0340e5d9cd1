//! Time source abstraction.
//!
//! Calibration paces itself with short sleeps and the color adaptation is
//! rate limited in wall-clock time; injecting the clock keeps both testable
//! without real waiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Millisecond tick source plus sleeping.
pub trait Clock {
    /// Monotonic milliseconds since some fixed origin.
    fn ticks_ms(&self) -> u64;

    /// Block the calling thread for the given number of milliseconds.
    fn sleep_ms(&self, ms: u64);
}

/// Real time: ticks from a fixed `Instant`, sleeping via the OS.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn ticks_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// Simulated time for tests.
///
/// `sleep_ms` advances the clock instead of blocking. `advance_on_read`
/// makes every tick read move time forward, which lets tests fake a frame
/// duration for the FPS estimate.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
    advance_on_read: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Make every `ticks_ms` call advance time by `ms` first.
    pub fn set_advance_on_read(&self, ms: u64) {
        self.advance_on_read.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn ticks_ms(&self) -> u64 {
        let step = self.advance_on_read.load(Ordering::SeqCst);
        if step > 0 {
            self.now_ms.fetch_add(step, Ordering::SeqCst);
        }
        self.now_ms.load(Ordering::SeqCst)
    }

    fn sleep_ms(&self, ms: u64) {
        self.advance(ms);
    }
}

impl<K: Clock + ?Sized> Clock for std::sync::Arc<K> {
    fn ticks_ms(&self) -> u64 {
        (**self).ticks_ms()
    }

    fn sleep_ms(&self, ms: u64) {
        (**self).sleep_ms(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.ticks_ms(), 0);
        clock.sleep_ms(150);
        assert_eq!(clock.ticks_ms(), 150);
    }

    #[test]
    fn test_manual_clock_advance_on_read() {
        let clock = ManualClock::new();
        clock.set_advance_on_read(5);
        let first = clock.ticks_ms();
        let second = clock.ticks_ms();
        assert_eq!(second - first, 5);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::default();
        let a = clock.ticks_ms();
        let b = clock.ticks_ms();
        assert!(b >= a);
    }
}
