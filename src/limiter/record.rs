//! Per-identifier attempt state.

use chrono::{DateTime, Utc};

use super::policy::AttemptPolicy;

/// Attempts recorded for one identifier.
///
/// The identifier itself is the key of the limiter's map, so it is not
/// repeated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// Attempts counted since `window_start`
    pub count: u32,
    /// When the current counting window opened
    pub window_start: DateTime<Utc>,
    /// End of the active lockout, if one was ever started in this window
    pub blocked_until: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    /// A record holding a single attempt made at `now`.
    pub fn first_attempt(now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            window_start: now,
            blocked_until: None,
        }
    }

    /// Whether a lockout is in force at `now`.
    pub fn is_blocked_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.blocked_until, Some(until) if until > now)
    }

    /// Whether a lockout was set and has run out by `now`.
    pub fn block_elapsed_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.blocked_until, Some(until) if until <= now)
    }

    /// Whether the counting window has closed by `now`.
    pub fn window_expired_at(&self, now: DateTime<Utc>, policy: &AttemptPolicy) -> bool {
        now.signed_duration_since(self.window_start) > policy.window_delta()
    }

    /// A record that no longer affects any decision and can be dropped.
    pub fn is_stale_at(&self, now: DateTime<Utc>, policy: &AttemptPolicy) -> bool {
        match self.blocked_until {
            Some(until) => until <= now,
            None => self.window_expired_at(now, policy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    #[test]
    fn test_first_attempt() {
        let record = AttemptRecord::first_attempt(t0());
        assert_eq!(record.count, 1);
        assert_eq!(record.window_start, t0());
        assert!(record.blocked_until.is_none());
        assert!(!record.is_blocked_at(t0()));
    }

    #[test]
    fn test_block_boundaries() {
        let mut record = AttemptRecord::first_attempt(t0());
        let until = t0() + TimeDelta::minutes(15);
        record.blocked_until = Some(until);

        assert!(record.is_blocked_at(until - TimeDelta::seconds(1)));
        assert!(!record.is_blocked_at(until));
        assert!(record.block_elapsed_at(until));
        assert!(!record.block_elapsed_at(until - TimeDelta::seconds(1)));
    }

    #[test]
    fn test_window_expiry_is_strict() {
        let policy = AttemptPolicy::default();
        let record = AttemptRecord::first_attempt(t0());

        assert!(!record.window_expired_at(t0() + TimeDelta::minutes(15), &policy));
        assert!(record.window_expired_at(
            t0() + TimeDelta::minutes(15) + TimeDelta::milliseconds(1),
            &policy
        ));
    }

    #[test]
    fn test_blocked_record_is_not_stale_after_window() {
        let policy = AttemptPolicy::default();
        let mut record = AttemptRecord::first_attempt(t0());
        record.blocked_until = Some(t0() + TimeDelta::minutes(30));

        let later = t0() + TimeDelta::minutes(20);
        assert!(record.window_expired_at(later, &policy));
        assert!(!record.is_stale_at(later, &policy));
        assert!(record.is_stale_at(t0() + TimeDelta::minutes(30), &policy));
    }
}
