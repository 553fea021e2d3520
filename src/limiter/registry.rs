//! Named guards, one limiter per protected operation.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::attempts::AttemptLimiter;
use super::clock::{Clock, SystemClock};
use crate::config::GuardConfig;
use crate::error::{Result, TurnstileError};
use crate::identifier;

/// A limiter bound to one protected operation such as `login`.
pub struct Guard<C: Clock = SystemClock> {
    limiter: Arc<AttemptLimiter<C>>,
    normalize_identifiers: bool,
}

impl<C: Clock> Guard<C> {
    pub fn new(limiter: Arc<AttemptLimiter<C>>, normalize_identifiers: bool) -> Self {
        Self {
            limiter,
            normalize_identifiers,
        }
    }

    pub fn limiter(&self) -> &Arc<AttemptLimiter<C>> {
        &self.limiter
    }

    /// Put a caller-supplied identifier into the form this guard keys on.
    pub fn identifier<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        if self.normalize_identifiers {
            identifier::normalize(raw)
        } else {
            Cow::Borrowed(raw)
        }
    }
}

/// All configured guards.
///
/// Every guard owns an independent limiter, so attempts against `login`
/// never count toward `register`.
pub struct GuardRegistry<C: Clock = SystemClock> {
    guards: BTreeMap<String, Guard<C>>,
}

impl GuardRegistry<SystemClock> {
    /// Build guards reading the system clock.
    pub fn from_config(guards: &BTreeMap<String, GuardConfig>) -> Result<Self> {
        Self::from_config_with_clock(guards, SystemClock)
    }
}

impl<C: Clock + Clone> GuardRegistry<C> {
    /// Build guards that all share `clock`.
    pub fn from_config_with_clock(
        guards: &BTreeMap<String, GuardConfig>,
        clock: C,
    ) -> Result<Self> {
        let mut registry = Self::new();

        for (name, config) in guards {
            let policy = config.to_policy()?;
            info!(
                guard = %name,
                max_attempts = policy.max_attempts(),
                window = ?policy.window(),
                block = ?policy.block(),
                lockout = ?policy.lockout(),
                "Configured guard"
            );
            let limiter = Arc::new(AttemptLimiter::with_clock(policy, clock.clone()));
            registry.insert(name, Guard::new(limiter, config.normalize_identifiers));
        }

        Ok(registry)
    }
}

impl<C: Clock> GuardRegistry<C> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            guards: BTreeMap::new(),
        }
    }

    /// Add or replace a guard.
    pub fn insert(&mut self, name: &str, guard: Guard<C>) {
        self.guards.insert(name.to_string(), guard);
    }

    /// Look up a guard by name.
    pub fn get(&self, name: &str) -> Result<&Guard<C>> {
        self.guards
            .get(name)
            .ok_or_else(|| TurnstileError::UnknownGuard(name.to_string()))
    }

    /// Names of all configured guards.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.guards.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Evict stale records from every guard, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        self.guards
            .iter()
            .map(|(name, guard)| {
                let evicted = guard.limiter.sweep();
                if evicted > 0 {
                    debug!(guard = %name, evicted, "Swept attempt records");
                }
                evicted
            })
            .sum()
    }

    /// Identifiers tracked across every guard.
    pub fn tracked_count(&self) -> usize {
        self.guards
            .values()
            .map(|guard| guard.limiter.tracked_count())
            .sum()
    }
}

impl<C: Clock> Default for GuardRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
