//! Client-side key repeat. Wayland compositors only announce the rate and
//! delay; the client generates the repeated presses itself.

use std::time::{Duration, Instant};

use tracing::trace;

const DEFAULT_RATE: i32 = 25;
const DEFAULT_DELAY_MS: i32 = 600;

#[derive(Debug, Clone, Copy)]
struct Armed {
    scancode: u32,
    next: Instant,
}

#[derive(Debug)]
pub struct KeyRepeat {
    /// `None` when the compositor disabled repeat (rate 0).
    interval: Option<Duration>,
    delay: Duration,
    armed: Option<Armed>,
}

impl Default for KeyRepeat {
    fn default() -> Self {
        let mut repeat = Self {
            interval: None,
            delay: Duration::ZERO,
            armed: None,
        };
        repeat.set_info(DEFAULT_RATE, DEFAULT_DELAY_MS);
        repeat
    }
}

impl KeyRepeat {
    /// `wl_keyboard.repeat_info`: `rate` in keys per second, `delay` in
    /// milliseconds.
    pub fn set_info(&mut self, rate: i32, delay: i32) {
        self.interval = (rate > 0).then(|| Duration::from_secs(1) / rate as u32);
        self.delay = Duration::from_millis(delay.max(0) as u64);
        if self.interval.is_none() {
            self.armed = None;
        }
    }

    pub fn press(&mut self, scancode: u32, repeats: bool, now: Instant) {
        if repeats && self.interval.is_some() {
            self.armed = Some(Armed {
                scancode,
                next: now + self.delay,
            });
        } else if self.armed.is_some_and(|armed| armed.scancode == scancode) {
            self.armed = None;
        }
    }

    pub fn release(&mut self, scancode: u32) {
        if self.armed.is_some_and(|armed| armed.scancode == scancode) {
            self.armed = None;
        }
    }

    pub fn cancel(&mut self) {
        self.armed = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.armed.map(|armed| armed.next)
    }

    /// The repeating scancode and how many repeats fell due by `now`.
    pub fn due(&mut self, now: Instant) -> Option<(u32, u32)> {
        let interval = self.interval?;
        let armed = self.armed.as_mut()?;
        if now < armed.next {
            return None;
        }
        let overdue = now - armed.next;
        let count = 1 + (overdue.as_nanos() / interval.as_nanos()).min(u32::MAX as u128 - 1) as u32;
        armed.next += interval * count;
        trace!(scancode = armed.scancode, count, "key repeat");
        Some((armed.scancode, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_first_repeat_after_delay_then_at_rate() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.set_info(10, 300);
        repeat.press(30, true, t0);

        assert_eq!(repeat.due(t0 + ms(299)), None);
        assert_eq!(repeat.due(t0 + ms(300)), Some((30, 1)));
        assert_eq!(repeat.deadline(), Some(t0 + ms(400)));
        assert_eq!(repeat.due(t0 + ms(350)), None);
        assert_eq!(repeat.due(t0 + ms(400)), Some((30, 1)));
    }

    #[test]
    fn test_late_wakeup_reports_every_missed_repeat() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.set_info(10, 100);
        repeat.press(30, true, t0);
        assert_eq!(repeat.due(t0 + ms(450)), Some((30, 4)));
        assert_eq!(repeat.deadline(), Some(t0 + ms(500)));
    }

    #[test]
    fn test_release_of_the_repeating_key_disarms() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.press(30, true, t0);
        repeat.release(31);
        assert!(repeat.deadline().is_some());
        repeat.release(30);
        assert_eq!(repeat.deadline(), None);
    }

    #[test]
    fn test_non_repeating_key_does_not_arm() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.press(42, false, t0);
        assert_eq!(repeat.deadline(), None);
    }

    #[test]
    fn test_newer_press_takes_over() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.set_info(20, 200);
        repeat.press(30, true, t0);
        repeat.press(31, true, t0 + ms(100));
        repeat.release(30);
        assert_eq!(repeat.due(t0 + ms(300)), Some((31, 1)));
    }

    #[test]
    fn test_zero_rate_disables_repeat() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.press(30, true, t0);
        repeat.set_info(0, 500);
        assert_eq!(repeat.deadline(), None);
        repeat.press(30, true, t0);
        assert_eq!(repeat.due(t0 + Duration::from_secs(5)), None);
    }

    #[test]
    fn test_focus_loss_cancels() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.press(30, true, t0);
        repeat.cancel();
        assert_eq!(repeat.due(t0 + Duration::from_secs(5)), None);
    }
}
