//! Millisecond time sources for the MS/TP silence timer
//!
//! The state machines never read the system time themselves; callers either
//! pass elapsed milliseconds to `silence_timer_tick` directly or let a
//! [`ClockDriver`] compute them from a [`Clock`].

use std::cell::Cell;
use std::time::Instant;

/// A monotonic millisecond counter
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Wall-clock time since the clock was created
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }

    pub fn set(&self, now_ms: u64) {
        self.now.set(now_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// Turns clock readings into tick deltas
#[derive(Debug)]
pub struct ClockDriver<C> {
    clock: C,
    last: u64,
}

impl<C: Clock> ClockDriver<C> {
    pub fn new(clock: C) -> Self {
        let last = clock.now_ms();
        Self { clock, last }
    }

    /// Milliseconds since the previous call, clamped to `u32::MAX`.
    ///
    /// A clock that steps backwards yields 0.
    pub fn elapsed_ms(&mut self) -> u32 {
        let now = self.clock.now_ms();
        let elapsed = now.saturating_sub(self.last);
        self.last = now.max(self.last);
        u32::try_from(elapsed).unwrap_or(u32::MAX)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_driver() {
        let clock = ManualClock::new(1_000);
        let mut driver = ClockDriver::new(&clock);
        assert_eq!(driver.elapsed_ms(), 0);

        clock.advance(40);
        assert_eq!(driver.elapsed_ms(), 40);
        assert_eq!(driver.elapsed_ms(), 0);

        clock.advance(5);
        clock.advance(7);
        assert_eq!(driver.elapsed_ms(), 12);
    }

    #[test]
    fn test_backwards_clock_yields_zero() {
        let clock = ManualClock::new(500);
        let mut driver = ClockDriver::new(&clock);
        clock.set(100);
        assert_eq!(driver.elapsed_ms(), 0);
        // time is measured from the highest reading seen
        clock.set(510);
        assert_eq!(driver.elapsed_ms(), 10);
    }

    #[test]
    fn test_large_gap_clamps() {
        let clock = ManualClock::new(0);
        let mut driver = ClockDriver::new(&clock);
        clock.advance(u64::from(u32::MAX) + 10);
        assert_eq!(driver.elapsed_ms(), u32::MAX);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
