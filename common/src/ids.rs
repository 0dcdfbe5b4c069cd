use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Hands out strictly increasing epoch-millisecond values.
///
/// Two calls in the same millisecond get consecutive values, so identifiers
/// derived from them never repeat within a process.
#[derive(Debug, Default)]
pub struct IdClock {
    last: AtomicI64,
}

impl IdClock {
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    pub fn next_millis(&self) -> i64 {
        self.next_after(Utc::now().timestamp_millis())
    }

    /// Next value given the current wall-clock reading.
    pub fn next_after(&self, now_millis: i64) -> i64 {
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_millis.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

static CLOCK: IdClock = IdClock::new();

/// Time-derived opaque identifier, used for offline products, orders and sessions.
pub fn time_token() -> String {
    CLOCK.next_millis().to_string()
}

/// Millisecond reading from the shared process clock.
pub fn next_millis() -> i64 {
    CLOCK.next_millis()
}
