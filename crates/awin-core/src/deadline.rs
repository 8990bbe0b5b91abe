//! Accumulates the soonest internal deadline (key repeat, cursor animation)
//! so a single blocking wait can serve every timer-driven feature.

use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalTimeout {
    soonest: Option<Instant>,
}

impl GlobalTimeout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.soonest = None;
    }

    pub fn consider(&mut self, deadline: Option<Instant>) {
        if let Some(deadline) = deadline {
            self.soonest = Some(match self.soonest {
                Some(current) => current.min(deadline),
                None => deadline,
            });
        }
    }

    pub fn soonest(&self) -> Option<Instant> {
        self.soonest
    }

    /// Time to block for: the minimum of the caller's bound and the soonest
    /// internal deadline. `None` means wait indefinitely.
    pub fn timeout(&self, now: Instant, caller: Option<Duration>) -> Option<Duration> {
        let internal = self
            .soonest
            .map(|deadline| deadline.saturating_duration_since(now));
        match (caller, internal) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_deadlines_waits_for_caller_bound() {
        let timeout = GlobalTimeout::new();
        let now = Instant::now();
        assert_eq!(timeout.timeout(now, None), None);
        assert_eq!(
            timeout.timeout(now, Some(Duration::from_millis(30))),
            Some(Duration::from_millis(30))
        );
    }

    #[test]
    fn test_soonest_internal_deadline_wins() {
        let now = Instant::now();
        let mut timeout = GlobalTimeout::new();
        timeout.consider(Some(now + Duration::from_millis(500)));
        timeout.consider(None);
        timeout.consider(Some(now + Duration::from_millis(25)));
        assert_eq!(
            timeout.timeout(now, Some(Duration::from_secs(1))),
            Some(Duration::from_millis(25))
        );
        assert_eq!(timeout.timeout(now, None), Some(Duration::from_millis(25)));
    }

    #[test]
    fn test_elapsed_deadline_is_zero() {
        let now = Instant::now();
        let mut timeout = GlobalTimeout::new();
        timeout.consider(Some(now));
        let later = now + Duration::from_millis(10);
        assert_eq!(timeout.timeout(later, None), Some(Duration::ZERO));
        timeout.reset();
        assert!(timeout.soonest().is_none());
    }
}
