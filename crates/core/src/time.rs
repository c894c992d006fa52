//! Injectable clock used for probe duration measurement

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Source of wall-clock timestamps
pub trait TimeSource: Send + Sync + fmt::Debug {
    /// Current timestamp
    fn now(&self) -> DateTime<Utc>;
}

/// System clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that hands out queued timestamps in order.
///
/// Once the queue is drained the last timestamp is repeated.
#[derive(Debug)]
pub struct ScriptedTimeSource {
    queue: Mutex<VecDeque<DateTime<Utc>>>,
    last: Mutex<DateTime<Utc>>,
}

impl ScriptedTimeSource {
    /// Create a clock that replays `instants`
    pub fn new<I: IntoIterator<Item = DateTime<Utc>>>(instants: I) -> Self {
        let queue: VecDeque<_> = instants.into_iter().collect();
        let last = queue.front().copied().unwrap_or_else(Utc::now);
        Self {
            queue: Mutex::new(queue),
            last: Mutex::new(last),
        }
    }

    /// Create a clock from millisecond offsets relative to `base`
    pub fn from_offsets_ms(base: DateTime<Utc>, offsets: &[i64]) -> Self {
        Self::new(
            offsets
                .iter()
                .map(|ms| base + chrono::Duration::milliseconds(*ms)),
        )
    }

    /// Queue another timestamp
    pub fn push(&self, instant: DateTime<Utc>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(instant);
        }
    }
}

impl TimeSource for ScriptedTimeSource {
    fn now(&self) -> DateTime<Utc> {
        let next = self.queue.lock().ok().and_then(|mut queue| queue.pop_front());
        match (next, self.last.lock()) {
            (Some(instant), Ok(mut last)) => {
                *last = instant;
                instant
            }
            (Some(instant), Err(_)) => instant,
            (None, Ok(last)) => *last,
            (None, Err(_)) => Utc::now(),
        }
    }
}

/// Elapsed time between two timestamps, negative spans clamped to zero
pub fn elapsed_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
    (end - start).to_std().unwrap_or(Duration::ZERO)
}
