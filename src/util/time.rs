//! Time utilities for the simulation

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

/// Record process start; later calls keep the first value
pub fn init_server_time() {
    STARTED_AT.get_or_init(Instant::now);
}

/// Whole seconds since `init_server_time`, 0 if it was never called
pub fn uptime_secs() -> u64 {
    STARTED_AT.get().map_or(0, |start| start.elapsed().as_secs())
}

/// Whole milliseconds in a duration, saturating at `u64::MAX`
pub fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Time left of a `total` window that opened at `since`, as seen at `now`.
pub fn remaining(since: Instant, total: Duration, now: Instant) -> Duration {
    total.saturating_sub(now.saturating_duration_since(since))
}

/// Tick interval for a rate in ticks per second
pub fn tick_interval(tick_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(tick_rate.max(1)))
}
