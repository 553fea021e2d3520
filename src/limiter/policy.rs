//! Attempt budget and lockout policy.

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnstileError};

/// Default number of attempts allowed per window.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default length of the counting window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);
/// Default lockout once the budget is exceeded.
pub const DEFAULT_BLOCK: Duration = Duration::from_secs(15 * 60);

/// What happens to an active lockout when further attempts arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockoutMode {
    /// `blocked_until` is fixed when the lockout starts and only ends by
    /// expiring. Attempts during the lockout are denied without touching
    /// the record.
    #[default]
    Fixed,
    /// Every attempt made while the window is still open pushes
    /// `blocked_until` to `now + block`. A caller that keeps hammering stays
    /// locked out until it goes quiet for a full window.
    Extend,
}

/// Limits applied to every identifier tracked by one limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptPolicy {
    max_attempts: u32,
    window: Duration,
    block: Duration,
    lockout: LockoutMode,
}

impl AttemptPolicy {
    /// Create a policy, rejecting values that can never admit an attempt or
    /// cannot be represented as a calendar offset.
    pub fn new(max_attempts: u32, window: Duration, block: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(TurnstileError::InvalidPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        for (name, value) in [("window", window), ("block", block)] {
            if value.is_zero() {
                return Err(TurnstileError::InvalidPolicy(format!(
                    "{} duration must be non-zero",
                    name
                )));
            }
            if TimeDelta::from_std(value).is_err() {
                return Err(TurnstileError::InvalidPolicy(format!(
                    "{} duration {:?} is out of range",
                    name, value
                )));
            }
        }

        Ok(Self {
            max_attempts,
            window,
            block,
            lockout: LockoutMode::default(),
        })
    }

    /// Replace the lockout mode.
    pub fn with_lockout(mut self, lockout: LockoutMode) -> Self {
        self.lockout = lockout;
        self
    }

    /// Attempts allowed per window before a lockout starts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Length of the counting window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Length of a lockout.
    pub fn block(&self) -> Duration {
        self.block
    }

    pub fn lockout(&self) -> LockoutMode {
        self.lockout
    }

    pub(crate) fn window_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.window).unwrap_or(TimeDelta::MAX)
    }

    pub(crate) fn block_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.block).unwrap_or(TimeDelta::MAX)
    }
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: DEFAULT_WINDOW,
            block: DEFAULT_BLOCK,
            lockout: LockoutMode::default(),
        }
    }
}
