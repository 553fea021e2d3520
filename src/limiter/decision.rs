//! The outcome of recording an attempt.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Result of [`AttemptLimiter::record_attempt`](super::AttemptLimiter::record_attempt).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptDecision {
    /// Whether the caller may go ahead with the attempt
    pub allowed: bool,
    /// Attempts left in the current window, zero once denied
    pub remaining_attempts: u32,
    /// End of the lockout, set only when the attempt was denied
    pub blocked_until: Option<DateTime<Utc>>,
    /// The instant the decision was made
    pub decided_at: DateTime<Utc>,
}

impl AttemptDecision {
    pub(crate) fn allow(remaining_attempts: u32, decided_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            remaining_attempts,
            blocked_until: None,
            decided_at,
        }
    }

    pub(crate) fn deny(blocked_until: DateTime<Utc>, decided_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            remaining_attempts: 0,
            blocked_until: Some(blocked_until),
            decided_at,
        }
    }

    /// How long the caller should wait, measured from `decided_at`.
    ///
    /// `None` when the attempt was allowed.
    pub fn retry_after(&self) -> Option<Duration> {
        self.blocked_until.map(|until| {
            until
                .signed_duration_since(self.decided_at)
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
    }
}
