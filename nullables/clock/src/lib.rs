use std::{
    ops::{Add, Sub},
    sync::Mutex,
    time::{Duration, Instant},
};

/// A point on the steady clock. Only differences between two timestamps of
/// the same clock are meaningful.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    pub fn new_test_instance() -> Self {
        Self(Duration::from_secs(1_000_000))
    }

    /// Time passed between this timestamp and a later reading of the clock
    pub fn elapsed(&self, now: Timestamp) -> Duration {
        now.0.saturating_sub(self.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 + rhs)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0.saturating_sub(rhs))
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

/// Monotonic clock with a nullable implementation for tests. The null clock
/// only moves when it is advanced manually.
pub struct SteadyClock {
    strategy: ClockStrategy,
}

// Both variants start well above zero so that subtracting durations
// shortly after startup cannot saturate to the epoch.
const START_OFFSET: Duration = Duration::from_secs(60 * 60 * 24);

enum ClockStrategy {
    Real(Instant),
    Null(Mutex<Timestamp>),
}

impl SteadyClock {
    pub fn new() -> Self {
        Self {
            strategy: ClockStrategy::Real(Instant::now()),
        }
    }

    pub fn new_null() -> Self {
        Self {
            strategy: ClockStrategy::Null(Mutex::new(Timestamp(START_OFFSET))),
        }
    }

    pub fn now(&self) -> Timestamp {
        match &self.strategy {
            ClockStrategy::Real(start) => Timestamp(START_OFFSET + start.elapsed()),
            ClockStrategy::Null(now) => *now.lock().unwrap(),
        }
    }

    /// Moves a null clock forward. Panics on a real clock.
    pub fn advance(&self, duration: Duration) {
        match &self.strategy {
            ClockStrategy::Real(_) => panic!("cannot advance a real clock"),
            ClockStrategy::Null(now) => {
                let mut guard = now.lock().unwrap();
                *guard = *guard + duration;
            }
        }
    }
}

impl Default for SteadyClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_clock_is_monotonic() {
        let clock = SteadyClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn null_clock_stands_still() {
        let clock = SteadyClock::new_null();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn null_clock_advances() {
        let clock = SteadyClock::new_null();
        let before = clock.now();
        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.now() - before, Duration::from_secs(3));
    }

    #[test]
    fn timestamp_arithmetic() {
        let ts = Timestamp::new_test_instance();
        assert_eq!((ts + Duration::from_secs(5)) - ts, Duration::from_secs(5));
        assert_eq!(ts - (ts + Duration::from_secs(5)), Duration::ZERO);
        assert_eq!(ts.elapsed(ts + Duration::from_secs(2)), Duration::from_secs(2));
    }
}
