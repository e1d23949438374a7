//! Countdown arithmetic and the wall-clock sources it is evaluated against.
//!
//! Nothing here ticks. A countdown is stored as "remaining at `last_update`"
//! plus a running flag, and every reader derives the value for `now`.

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use time::OffsetDateTime;

/// Milliseconds since the Unix epoch, the unit every stored timestamp uses.
pub type Timestamp = i64;

/// Milliseconds in one second.
pub const MILLIS_PER_SECOND: u64 = 1_000;

/// Source of "now" for every derived read and every stamped write.
pub trait Clock: Send + Sync {
    /// Current wall-clock time in epoch milliseconds.
    fn now_ms(&self) -> Timestamp;
}

/// Wall clock backed by the operating system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Timestamp {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        i64::try_from(millis).unwrap_or(i64::MAX)
    }
}

/// Hand-driven clock shared between clones, used by tests and replays.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Elapsed milliseconds between two stamps. A `now` earlier than `since`
/// (clock skew between contexts) counts as no time at all.
pub fn elapsed_ms(since: Timestamp, now: Timestamp) -> u64 {
    u64::try_from(now.saturating_sub(since)).unwrap_or(0)
}

/// Remaining time of a countdown evaluated at `now`.
///
/// Never negative and never above `remaining`.
pub fn current_countdown(remaining: u64, running: bool, last_update: Timestamp, now: Timestamp) -> u64 {
    if !running {
        return remaining;
    }
    remaining.saturating_sub(elapsed_ms(last_update, now))
}

/// Remaining timeout in whole seconds; partial seconds are not consumed.
pub fn timeout_remaining_secs(time_left_secs: u32, last_update: Timestamp, now: Timestamp) -> u32 {
    let elapsed_secs = elapsed_ms(last_update, now) / MILLIS_PER_SECOND;
    let elapsed_secs = u32::try_from(elapsed_secs).unwrap_or(u32::MAX);
    time_left_secs.saturating_sub(elapsed_secs)
}

/// Convert whole seconds to milliseconds, saturating.
pub fn secs_to_ms(secs: u32) -> u64 {
    u64::from(secs).saturating_mul(MILLIS_PER_SECOND)
}
