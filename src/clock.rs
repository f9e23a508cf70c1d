use std::cell::Cell;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Time source for cache freshness and projection timestamps.
pub trait Clock {
    /// Monotonic time, used for freshness windows.
    fn now(&self) -> Instant;

    /// Wall-clock unix milliseconds, used to stamp synthetic entries.
    fn unix_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<Instant>,
    millis: Cell<i64>,
}

impl ManualClock {
    pub fn new(unix_millis: i64) -> Self {
        ManualClock {
            now: Cell::new(Instant::now()),
            millis: Cell::new(unix_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
        self.millis.set(self.millis.get() + by.as_millis() as i64);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn unix_millis(&self) -> i64 {
        self.millis.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_both_readings() {
        let clock = ManualClock::new(1_000);
        let start = clock.now();
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(250));
        assert_eq!(clock.unix_millis(), 1_250);
    }
}
