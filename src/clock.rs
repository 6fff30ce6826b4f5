use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall clock and sleeping, behind a trait so the updater can be driven with
/// virtual time in tests.
pub trait Clock {
    /// Seconds since the Unix epoch.
    fn now(&self) -> u64;

    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
