use chrono::{DateTime, Utc};

/// Wall-clock seam. Every component that compares against "now" takes one
/// of these instead of calling `Utc::now()` directly, so tests can steer
/// hold expiry deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
