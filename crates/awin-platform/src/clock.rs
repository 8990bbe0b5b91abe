//! Monotonic time with a known frequency.

use std::time::Instant;

pub trait Clock {
    fn ticks(&self) -> u64;
    /// Ticks per second.
    fn frequency(&self) -> u64;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    base: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { base: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn ticks(&self) -> u64 {
        self.base.elapsed().as_nanos() as u64
    }

    fn frequency(&self) -> u64 {
        1_000_000_000
    }
}

/// Per-process calibration: time zero is the moment of calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerCalibration {
    pub offset: u64,
    pub frequency: u64,
}

impl TimerCalibration {
    pub fn calibrate(clock: &dyn Clock) -> Self {
        Self {
            offset: clock.ticks(),
            frequency: clock.frequency().max(1),
        }
    }

    pub fn seconds(&self, clock: &dyn Clock) -> f64 {
        clock.ticks().saturating_sub(self.offset) as f64 / self.frequency as f64
    }

    /// Moves time zero so that `seconds` is reported now.
    pub fn set_seconds(&mut self, clock: &dyn Clock, seconds: f64) {
        let elapsed = (seconds.max(0.0) * self.frequency as f64) as u64;
        self.offset = clock.ticks().saturating_sub(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::Cell;

    struct FakeClock(Cell<u64>);

    impl Clock for FakeClock {
        fn ticks(&self) -> u64 {
            self.0.get()
        }

        fn frequency(&self) -> u64 {
            1000
        }
    }

    #[test]
    fn test_seconds_since_calibration() {
        let clock = FakeClock(Cell::new(5_000));
        let timer = TimerCalibration::calibrate(&clock);
        assert_eq!(timer.offset, 5_000);
        clock.0.set(7_500);
        assert_relative_eq!(timer.seconds(&clock), 2.5);
    }

    #[test]
    fn test_set_seconds() {
        let clock = FakeClock(Cell::new(10_000));
        let mut timer = TimerCalibration::calibrate(&clock);
        timer.set_seconds(&clock, 4.0);
        assert_relative_eq!(timer.seconds(&clock), 4.0);
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::default();
        let timer = TimerCalibration::calibrate(&clock);
        assert!(timer.seconds(&clock) >= 0.0);
        assert_eq!(clock.frequency(), 1_000_000_000);
    }
}
