//! Background eviction of stale attempt records.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::clock::Clock;
use super::registry::GuardRegistry;

/// Spawn a task that sweeps every guard each `interval` until `shutdown`
/// turns `true` or its sender is dropped.
///
/// Sweeping only removes records that can no longer change a decision, so
/// it runs off the request path without affecting outcomes.
pub fn spawn_sweeper<C: Clock>(
    registry: Arc<GuardRegistry<C>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval = ?interval, "Starting attempt record sweeper");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = registry.sweep();
                    debug!(
                        evicted,
                        tracked = registry.tracked_count(),
                        "Sweep complete"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Attempt record sweeper stopped");
    })
}
