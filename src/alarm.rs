use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

/// represents one pending or dispatched alarm
/// the deadline is kept as an `Instant` so wall clock changes don't move it,
/// `created_at` is only for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub id: u64,
    pub duration_seconds: u64,
    pub due_at: Instant,
    pub message: String,
    pub created_at: DateTime<Local>,
}

impl Alarm {
    #[must_use]
    pub fn new(id: u64, duration_seconds: u64, message: String, tick: Duration) -> Self {
        Self {
            id,
            duration_seconds,
            due_at: deadline(Instant::now(), duration_seconds, tick),
            message,
            created_at: Local::now(),
        }
    }

    /// used by `Change_Alarm`, the deadline counts from now not from creation
    pub fn reschedule(&mut self, duration_seconds: u64, message: String, tick: Duration) {
        self.duration_seconds = duration_seconds;
        self.message = message;
        self.due_at = deadline(Instant::now(), duration_seconds, tick);
    }

    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.due_at <= now
    }

    #[must_use]
    pub fn time_left(&self, now: Instant) -> Duration {
        self.due_at.saturating_duration_since(now)
    }

    /// whole alarm seconds left, rounded up so a running alarm never shows 0
    #[must_use]
    pub fn remaining_seconds(&self, now: Instant, tick: Duration) -> u64 {
        let left = self.time_left(now).as_nanos();
        let tick = tick.as_nanos().max(1);
        u64::try_from(left.div_ceil(tick)).unwrap_or(u64::MAX)
    }
}

// far enough out to never fire, close enough for `Instant` to represent
const NEVER: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn deadline(from: Instant, duration_seconds: u64, tick: Duration) -> Instant {
    let delay = tick
        .as_nanos()
        .checked_mul(u128::from(duration_seconds))
        .and_then(|nanos| {
            let secs = u64::try_from(nanos / 1_000_000_000).ok()?;
            // the remainder is below one second, so it fits
            let subsec = u32::try_from(nanos % 1_000_000_000).ok()?;
            Some(Duration::new(secs, subsec))
        });
    match delay.and_then(|delay| from.checked_add(delay)) {
        Some(due_at) => due_at,
        None => {
            log::warn!("{duration_seconds}s is too far out to schedule, capping the deadline");
            from.checked_add(NEVER).unwrap_or(from)
        }
    }
}

/// Cuts `message` down to `limit` characters.
#[must_use]
pub fn clamp_message(mut message: String, limit: usize) -> String {
    if let Some((cut, _)) = message.char_indices().nth(limit) {
        log::warn!("message longer than {limit} characters, truncating");
        message.truncate(cut);
    }
    message
}
