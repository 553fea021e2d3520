//! Core attempt limiter.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use super::clock::{Clock, SystemClock};
use super::decision::AttemptDecision;
use super::policy::{AttemptPolicy, LockoutMode};
use super::record::AttemptRecord;

/// Tracks attempts per identifier and decides whether new ones are allowed.
///
/// Identifiers are opaque: the limiter never trims, lowercases or validates
/// them, so callers must normalize before calling in.
///
/// Records live in a sharded map. A decision holds the shard lock for the
/// identifier's entry from the first read to the last write, so concurrent
/// attempts for the same identifier are serialized while unrelated
/// identifiers on other shards proceed in parallel.
pub struct AttemptLimiter<C: Clock = SystemClock> {
    /// Attempt records keyed by identifier
    records: DashMap<String, AttemptRecord>,
    /// Limits shared by every identifier
    policy: AttemptPolicy,
    /// Source of the current time
    clock: C,
}

impl AttemptLimiter<SystemClock> {
    /// Create a limiter that reads the system clock.
    pub fn new(policy: AttemptPolicy) -> Self {
        Self::with_clock(policy, SystemClock)
    }
}

impl<C: Clock> AttemptLimiter<C> {
    /// Create a limiter with an explicit time source.
    pub fn with_clock(policy: AttemptPolicy, clock: C) -> Self {
        Self {
            records: DashMap::new(),
            policy,
            clock,
        }
    }

    /// Whether `identifier` is locked out right now.
    ///
    /// A record whose lockout has run out, or whose window has closed
    /// without a lockout, is dropped on the way.
    pub fn is_blocked(&self, identifier: &str) -> bool {
        let now = self.clock.now();

        if self
            .records
            .remove_if(identifier, |_, record| record.is_stale_at(now, &self.policy))
            .is_some()
        {
            debug!(identifier = %identifier, "Evicted expired attempt record");
            return false;
        }

        let blocked = self
            .records
            .get(identifier)
            .is_some_and(|record| record.is_blocked_at(now));

        trace!(identifier = %identifier, blocked, "Checked lockout");
        blocked
    }

    /// Record one attempt for `identifier` and decide whether it may proceed.
    ///
    /// Call exactly once per real attempt, regardless of its outcome.
    pub fn record_attempt(&self, identifier: &str) -> AttemptDecision {
        let now = self.clock.now();
        let max_attempts = self.policy.max_attempts();

        let decision = match self.records.entry(identifier.to_owned()) {
            Entry::Vacant(vacant) => {
                vacant.insert(AttemptRecord::first_attempt(now));
                debug!(identifier = %identifier, "Tracking new identifier");
                AttemptDecision::allow(max_attempts - 1, now)
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                self.apply_attempt(identifier, record, now)
            }
        };

        trace!(
            identifier = %identifier,
            allowed = decision.allowed,
            remaining = decision.remaining_attempts,
            "Recorded attempt"
        );
        decision
    }

    fn apply_attempt(
        &self,
        identifier: &str,
        record: &mut AttemptRecord,
        now: DateTime<Utc>,
    ) -> AttemptDecision {
        let max_attempts = self.policy.max_attempts();

        if record.block_elapsed_at(now) {
            debug!(identifier = %identifier, "Lockout over, starting a new window");
            *record = AttemptRecord::first_attempt(now);
            return AttemptDecision::allow(max_attempts - 1, now);
        }

        if self.policy.lockout() == LockoutMode::Fixed {
            if let Some(until) = record.blocked_until.filter(|until| *until > now) {
                return AttemptDecision::deny(until, now);
            }
        }

        // The window is measured from its first attempt, so under
        // `LockoutMode::Extend` a lockout that outlives the window is
        // cleared here as well.
        if record.window_expired_at(now, &self.policy) {
            debug!(
                identifier = %identifier,
                stale_count = record.count,
                "Window expired, starting a new one"
            );
            *record = AttemptRecord::first_attempt(now);
            return AttemptDecision::allow(max_attempts - 1, now);
        }

        record.count = record.count.saturating_add(1);
        if record.count > max_attempts {
            let until = now
                .checked_add_signed(self.policy.block_delta())
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            if record.blocked_until.is_none() {
                warn!(
                    identifier = %identifier,
                    count = record.count,
                    blocked_until = %until,
                    "Attempt budget exhausted, locking out"
                );
            }
            record.blocked_until = Some(until);
            return AttemptDecision::deny(until, now);
        }

        AttemptDecision::allow(max_attempts - record.count, now)
    }

    /// Forget everything recorded for `identifier`.
    ///
    /// Returns whether a record existed.
    pub fn reset(&self, identifier: &str) -> bool {
        let removed = self.records.remove(identifier).is_some();
        if removed {
            debug!(identifier = %identifier, "Reset attempt record");
        }
        removed
    }

    /// Drop every record that can no longer influence a decision.
    ///
    /// Returns the number of records removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut evicted = 0;
        self.records.retain(|_, record| {
            let stale = record.is_stale_at(now, &self.policy);
            if stale {
                evicted += 1;
            }
            !stale
        });
        evicted
    }

    /// A snapshot of the record for `identifier`, if one is tracked.
    pub fn record(&self, identifier: &str) -> Option<AttemptRecord> {
        self.records.get(identifier).map(|record| record.clone())
    }

    /// Number of identifiers currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.records.len()
    }

    pub fn policy(&self) -> &AttemptPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl Default for AttemptLimiter<SystemClock> {
    fn default() -> Self {
        Self::new(AttemptPolicy::default())
    }
}
