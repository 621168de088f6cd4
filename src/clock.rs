//! Time sources and passive timers
//!
//! Every cooldown in the scheduler is a passive [`Timer`] checked on demand
//! against an injected [`Clock`], so tests can drive time forward without
//! sleeping and without any background timer threads.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

use crate::utils::lock_unpoisoned;

/// Source of "now" for all timer checks
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and the simulator
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at the current system time
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = lock_unpoisoned(&self.now);
        *now = *now + by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *lock_unpoisoned(&self.now) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock_unpoisoned(&self.now)
    }
}

/// A countdown started at some instant with a fixed duration.
///
/// Timers never fire; callers ask whether they have expired. A zero-duration
/// timer is expired from the start, which is how the rate-limit timer begins.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    started_at: DateTime<Utc>,
    duration: Duration,
}

impl Timer {
    /// Start a timer now with the given duration
    pub fn new(duration: Duration, clock: &dyn Clock) -> Self {
        Self {
            started_at: clock.now(),
            duration,
        }
    }

    /// A timer that is already expired (zero duration)
    pub fn expired(clock: &dyn Clock) -> Self {
        Self::new(Duration::zero(), clock)
    }

    /// Restart the countdown, keeping the duration
    pub fn reset(&mut self, clock: &dyn Clock) {
        self.started_at = clock.now();
    }

    /// Restart the countdown with a new duration
    pub fn rearm(&mut self, duration: Duration, clock: &dyn Clock) {
        self.started_at = clock.now();
        self.duration = duration;
    }

    /// Time since the last reset
    pub fn elapsed(&self, clock: &dyn Clock) -> Duration {
        clock.now() - self.started_at
    }

    /// Time until expiry, clamped to zero
    pub fn remaining(&self, clock: &dyn Clock) -> Duration {
        (self.duration - self.elapsed(clock)).max(Duration::zero())
    }

    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        self.elapsed(clock) >= self.duration
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Duration helpers matching how the configuration talks about time
pub fn seconds(n: i64) -> Duration {
    Duration::seconds(n)
}

pub fn minutes(n: i64) -> Duration {
    Duration::minutes(n)
}

pub fn days(n: i64) -> Duration {
    Duration::days(n)
}

pub fn years(n: i64) -> Duration {
    Duration::days(n * 365)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_expiry_with_manual_clock() {
        let clock = ManualClock::starting_now();
        let timer = Timer::new(seconds(30), &clock);

        assert!(!timer.is_expired(&clock));
        assert_eq!(timer.remaining(&clock), seconds(30));

        clock.advance(seconds(29));
        assert!(!timer.is_expired(&clock));

        clock.advance(seconds(1));
        assert!(timer.is_expired(&clock));
        assert_eq!(timer.remaining(&clock), Duration::zero());
    }

    #[test]
    fn test_zero_duration_timer_starts_expired() {
        let clock = ManualClock::starting_now();
        let timer = Timer::expired(&clock);
        assert!(timer.is_expired(&clock));
    }

    #[test]
    fn test_reset_restarts_countdown() {
        let clock = ManualClock::starting_now();
        let mut timer = Timer::new(seconds(10), &clock);

        clock.advance(seconds(15));
        assert!(timer.is_expired(&clock));

        timer.reset(&clock);
        assert!(!timer.is_expired(&clock));
        assert_eq!(timer.elapsed(&clock), Duration::zero());
    }

    #[test]
    fn test_rearm_changes_duration() {
        let clock = ManualClock::starting_now();
        let mut timer = Timer::expired(&clock);

        timer.rearm(minutes(2), &clock);
        assert!(!timer.is_expired(&clock));
        clock.advance(minutes(2));
        assert!(timer.is_expired(&clock));
    }
}
