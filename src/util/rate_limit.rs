//! Inbound flood protection

use std::num::NonZeroU32;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

/// Max inbound lines per second from a single connection
pub const INBOUND_LINE_RATE_LIMIT: u32 = 120;

type LineLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket owned by one connection's read loop. Bursts up to the
/// per-second quota are allowed.
pub struct ConnectionRateLimiter {
    lines: LineLimiter,
}

impl ConnectionRateLimiter {
    pub fn new() -> Self {
        Self::with_rate(INBOUND_LINE_RATE_LIMIT)
    }

    /// A zero rate is raised to one line per second
    pub fn with_rate(lines_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(lines_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            lines: RateLimiter::direct(Quota::per_second(per_second)),
        }
    }

    /// Take a token for one inbound line; false means drop it
    pub fn check_line(&self) -> bool {
        self.lines.check().is_ok()
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
