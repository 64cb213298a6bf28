//! Background eviction of idle visitors.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use super::limiter::RateLimiter;

/// Default interval between sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Spawn a task that calls [`RateLimiter::sweep`] every `interval`.
///
/// The task only holds a weak reference and exits on the first tick after
/// the limiter has been dropped. Must be called from within a tokio runtime.
pub fn spawn_sweeper(limiter: &Arc<RateLimiter>, interval: Duration) -> JoinHandle<()> {
    let limiter = Arc::downgrade(limiter);

    info!(interval = ?interval, "Starting visitor sweeper");

    tokio::spawn(run_sweeper(limiter, interval))
}

async fn run_sweeper(limiter: Weak<RateLimiter>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; there is nothing to sweep yet.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(limiter) = limiter.upgrade() else {
            debug!("Rate limiter dropped, stopping visitor sweeper");
            break;
        };

        let evicted = limiter.sweep();
        if evicted > 0 {
            info!(evicted, remaining = limiter.len(), "Evicted idle visitors");
        }
        trace!(visitors = %limiter, "Visitor table after sweep");
    }
}
