//! Timestamp source for change messages.

use chrono::Utc;

pub trait Clock: Send + Sync {
    /// Current time as fractional epoch seconds (millisecond precision).
    fn now_epoch_seconds(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> f64 {
        Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

/// Clock frozen at one instant; keeps batches reproducible in tests and dry runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub f64);

impl Clock for FixedClock {
    fn now_epoch_seconds(&self) -> f64 {
        self.0
    }
}
