//! Time source for every shift and expiration decision.
//!
//! The engine never reads the system clock directly. Production wiring uses
//! [`SystemClock`]; tests drive a [`ManualClock`] so shift windows and session
//! timeouts can be exercised at exact instants.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;

/// Local wall-clock accessor shared by the whole engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Reads the host's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Clock pinned to `hour:minute` on an arbitrary fixed date. `None` when
    /// the time of day is out of range.
    pub fn at(hour: u32, minute: u32) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(2023, 10, 10)?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
        Some(Self::new(date.and_time(time)))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

/// Wall clock that follows tokio's (pausable) time, so `start_paused` tests
/// see timers and `now()` advance together.
#[cfg(test)]
pub(crate) struct TokioClock {
    base: NaiveDateTime,
    started: tokio::time::Instant,
}

#[cfg(test)]
impl TokioClock {
    pub(crate) fn starting_at(base: NaiveDateTime) -> Self {
        Self {
            base,
            started: tokio::time::Instant::now(),
        }
    }
}

#[cfg(test)]
impl Clock for TokioClock {
    fn now(&self) -> NaiveDateTime {
        let elapsed = Duration::from_std(self.started.elapsed()).unwrap_or_default();
        self.base + elapsed
    }
}
