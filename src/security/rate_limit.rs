//! Sliding window rate limiting.
//!
//! The limiter keeps two adjacent fixed windows and interpolates between
//! them: the previous window's count contributes linearly less as it
//! ages, and the current window counts in full.
//!
//! ```text
//!   prev_time          prev_time + unit          next_time
//!       |-------- previous --------|-------- current --------|
//!                                          ^ now
//!   estimate = prev_count * (2*unit - (now - prev_time)) / unit
//!            + cur_count + 1
//! ```

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::sync::Exclusive;

/// Source of monotonic time, in nanoseconds from an arbitrary origin.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> i64;
}

/// Clock backed by `Instant`.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(duration_nanos(by), Ordering::SeqCst);
    }

    pub fn set(&self, nanos: i64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

fn duration_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

#[derive(Debug)]
struct Window {
    unit: i64,
    max_per_unit: f64,
    prev_count: i64,
    cur_count: i64,
    prev_time: i64,
    next_time: i64,
}

impl Window {
    /// Move both windows forward until `now` falls inside them.
    fn slide(&mut self, now: i64) {
        if now <= self.next_time {
            return;
        }
        // Same result as stepping one unit at a time: after two or more
        // steps the "current" window that becomes previous is empty.
        let steps = (now - self.next_time + self.unit - 1) / self.unit;
        self.prev_count = if steps == 1 { self.cur_count } else { 0 };
        self.cur_count = 0;
        self.prev_time += steps * self.unit;
        self.next_time += steps * self.unit;
    }

    fn estimate(&self, now: i64) -> f64 {
        let overlap = (2 * self.unit - (now - self.prev_time)) as f64 / self.unit as f64;
        self.prev_count as f64 * overlap + (self.cur_count + 1) as f64
    }
}

/// Point-in-time view of the limiter state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSnapshot {
    pub unit_nanos: i64,
    pub max_per_unit: f64,
    pub prev_count: i64,
    pub cur_count: i64,
}

/// Sliding window limiter shared by all request handlers.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Exclusive<Window>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    /// Admit at most `max_per_unit` requests per `unit`.
    pub fn new(max_per_unit: f64, unit: Duration) -> Self {
        Self::with_clock(max_per_unit, unit, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(max_per_unit: f64, unit: Duration, clock: Arc<dyn Clock>) -> Self {
        let unit = duration_nanos(unit).max(1);
        let now = clock.now();
        Self {
            window: Exclusive::new(Window {
                unit,
                max_per_unit,
                prev_count: 0,
                cur_count: 0,
                prev_time: now - unit,
                next_time: now + unit,
            }),
            clock,
        }
    }

    /// Try to admit one request.
    ///
    /// Rejections leave the state untouched. A clock reading earlier than
    /// the window's lower boundary is always rejected.
    pub fn try_take(&self) -> bool {
        let mut w = self.window.lock();
        let now = self.clock.now();

        if now < w.prev_time {
            return false;
        }

        w.slide(now);

        if w.estimate(now) > w.max_per_unit {
            return false;
        }

        w.cur_count += 1;
        true
    }

    /// Hand `count` admissions back to the previous window, never below zero.
    ///
    /// This rebates the previous window rather than the one the admission
    /// was counted in; callers only need the pressure relief.
    pub fn restore(&self, count: i64) {
        self.window.with(|w| {
            w.prev_count = (w.prev_count - count).max(0);
        });
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        self.window.with(|w| WindowSnapshot {
            unit_nanos: w.unit,
            max_per_unit: w.max_per_unit,
            prev_count: w.prev_count,
            cur_count: w.cur_count,
        })
    }
}

/// Retry admission up to `max_tries` times, sleeping `pause` between
/// rejections. At least one attempt is always made.
pub async fn admit(limiter: &SlidingWindowLimiter, max_tries: u32, pause: Duration) -> bool {
    let tries = max_tries.max(1);
    for attempt in 1..=tries {
        if limiter.try_take() {
            return true;
        }
        if attempt < tries {
            tokio::time::sleep(pause).await;
        }
    }
    false
}
