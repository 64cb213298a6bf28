//! Core rate limiter implementation.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{duration_nanos, Clock, SystemClock};
use super::counter::{RateLimitDecision, VisitorCounter};

/// The registry of per-visitor counters.
///
/// Every visitor gets `rate` requests per `window`. Counters are created on
/// first sight and live until the sweeper evicts them. This struct is
/// thread-safe and meant to be shared behind an `Arc`.
pub struct RateLimiter {
    /// Counters indexed by client identity
    visitors: DashMap<String, Arc<VisitorCounter>>,
    /// Maximum requests per window
    rate: u64,
    /// Window length
    window: Duration,
    /// Cached `window` in nanoseconds
    window_nanos: i64,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter on the system clock.
    ///
    /// `rate` and `window` are expected to be non-zero; see
    /// [`ThrottleConfig::validate`](crate::config::ThrottleConfig::validate).
    pub fn new(rate: u64, window: Duration) -> Self {
        Self::with_clock(rate, window, Arc::new(SystemClock))
    }

    /// Create a rate limiter with an explicit time source.
    pub fn with_clock(rate: u64, window: Duration, clock: Arc<dyn Clock>) -> Self {
        debug_assert!(rate > 0, "rate must be positive");
        debug_assert!(!window.is_zero(), "window must be positive");
        Self {
            visitors: DashMap::new(),
            rate,
            window,
            window_nanos: duration_nanos(window),
            clock,
        }
    }

    /// Decide whether a request from `identity` may proceed, consuming a
    /// token if so.
    pub fn allow(&self, identity: &str) -> RateLimitDecision {
        let now = self.clock.now_nanos();
        let counter = self.get_or_create(identity);
        let decision = counter.try_acquire(now, self.rate, self.window_nanos);

        if decision.allowed {
            trace!(
                identity = %identity,
                remaining = decision.remaining,
                "Request allowed"
            );
        } else {
            debug!(
                identity = %identity,
                limit = self.rate,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Fetch the counter for `identity`, inserting a full one if absent.
    ///
    /// Concurrent first requests for the same identity all get the same
    /// counter; the entry API inserts at most once.
    pub fn get_or_create(&self, identity: &str) -> Arc<VisitorCounter> {
        if let Some(counter) = self.visitors.get(identity) {
            return Arc::clone(counter.value());
        }

        let counter = self
            .visitors
            .entry(identity.to_owned())
            .or_insert_with(|| {
                debug!(identity = %identity, rate = self.rate, "Creating new visitor counter");
                Arc::new(VisitorCounter::new(self.rate, self.clock.now_nanos()))
            });
        Arc::clone(counter.value())
    }

    /// Remove every visitor whose window started before `cutoff` (ns since
    /// epoch). Returns how many were removed.
    pub fn evict_stale(&self, cutoff: i64) -> usize {
        let mut evicted = 0;
        self.visitors.retain(|_, counter| {
            let keep = counter.last_refill() >= cutoff;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Evict visitors idle for at least two windows.
    pub fn sweep(&self) -> usize {
        let cutoff = self
            .clock
            .now_nanos()
            .saturating_sub(self.window_nanos.saturating_mul(2));
        self.evict_stale(cutoff)
    }

    /// Maximum requests per window.
    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in nanoseconds.
    pub fn window_nanos(&self) -> i64 {
        self.window_nanos
    }

    /// Current time according to this limiter's clock.
    pub fn now_nanos(&self) -> i64 {
        self.clock.now_nanos()
    }

    /// Get the number of tracked visitors.
    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    /// Whether no visitors are tracked.
    pub fn is_empty(&self) -> bool {
        self.visitors.is_empty()
    }

    /// Forget all visitors.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.visitors.clear();
    }
}

impl fmt::Display for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for entry in self.visitors.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}: {}", entry.key(), entry.value())?;
        }
        Ok(())
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate)
            .field("window", &self.window)
            .field("visitors", &self.visitors.len())
            .finish()
    }
}
