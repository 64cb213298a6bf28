//! Per-visitor fixed-window counter.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Tokens left in the current window after this request
    pub remaining: u64,
    /// Start of the current window, in nanoseconds since the Unix epoch
    pub window_start: i64,
}

impl RateLimitDecision {
    /// End of the current window, in nanoseconds since the Unix epoch.
    pub fn reset_at(&self, window_nanos: i64) -> i64 {
        self.window_start.saturating_add(window_nanos)
    }
}

/// Token state for one visitor.
///
/// Both fields are updated with compare-and-swap only, so any number of
/// requests for the same visitor can race without a lock. `last_refill` is
/// checked before `tokens`, which keeps a request from spending a token out
/// of a window that has already expired.
#[derive(Debug)]
pub struct VisitorCounter {
    /// Tokens remaining in the current window
    tokens: AtomicU64,
    /// When the current window started (ns since epoch)
    last_refill: AtomicI64,
}

impl VisitorCounter {
    /// Create a counter with a full bucket, starting its window at `now`.
    pub fn new(rate: u64, now: i64) -> Self {
        Self {
            tokens: AtomicU64::new(rate),
            last_refill: AtomicI64::new(now),
        }
    }

    /// Try to take one token at time `now`.
    ///
    /// If the window has elapsed, exactly one caller wins the CAS on
    /// `last_refill`, refills to `rate - 1` and is allowed. Losers of either
    /// CAS re-read the state and try again.
    pub fn try_acquire(&self, now: i64, rate: u64, window_nanos: i64) -> RateLimitDecision {
        loop {
            let last_refill = self.last_refill.load(Ordering::Acquire);
            let elapsed = now.saturating_sub(last_refill);

            if elapsed >= window_nanos {
                if self
                    .last_refill
                    .compare_exchange(last_refill, now, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    let remaining = rate.saturating_sub(1);
                    self.tokens.store(remaining, Ordering::Release);
                    return RateLimitDecision {
                        allowed: true,
                        remaining,
                        window_start: now,
                    };
                }
                continue;
            }

            let tokens = self.tokens.load(Ordering::Acquire);
            if tokens == 0 {
                return RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    window_start: last_refill,
                };
            }

            if self
                .tokens
                .compare_exchange(tokens, tokens - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return RateLimitDecision {
                    allowed: true,
                    remaining: tokens - 1,
                    window_start: last_refill,
                };
            }
        }
    }

    /// Tokens remaining in the current window.
    pub fn tokens(&self) -> u64 {
        self.tokens.load(Ordering::Acquire)
    }

    /// Start of the current window (ns since epoch).
    pub fn last_refill(&self) -> i64 {
        self.last_refill.load(Ordering::Acquire)
    }
}

impl fmt::Display for VisitorCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tokens(), self.last_refill())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    const WINDOW: i64 = 60_000_000_000;

    #[test]
    fn test_new_counter_is_full() {
        let counter = VisitorCounter::new(5, 100);
        assert_eq!(counter.tokens(), 5);
        assert_eq!(counter.last_refill(), 100);
    }

    #[test]
    fn test_acquire_counts_down_then_denies() {
        let counter = VisitorCounter::new(3, 0);

        for expected in [2, 1, 0] {
            let decision = counter.try_acquire(10, 3, WINDOW);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
            assert_eq!(decision.window_start, 0);
        }

        let denied = counter.try_acquire(10, 3, WINDOW);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        // A denial does not touch the state
        assert_eq!(counter.tokens(), 0);
        assert_eq!(counter.last_refill(), 0);
    }

    #[test]
    fn test_window_elapsed_refills() {
        let counter = VisitorCounter::new(2, 0);
        counter.try_acquire(1, 2, WINDOW);
        counter.try_acquire(2, 2, WINDOW);
        assert!(!counter.try_acquire(3, 2, WINDOW).allowed);

        let decision = counter.try_acquire(WINDOW, 2, WINDOW);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert_eq!(decision.window_start, WINDOW);
        assert_eq!(counter.last_refill(), WINDOW);
    }

    #[test]
    fn test_request_just_before_window_end_does_not_refill() {
        let counter = VisitorCounter::new(1, 0);
        assert!(counter.try_acquire(0, 1, WINDOW).allowed);
        assert!(!counter.try_acquire(WINDOW - 1, 1, WINDOW).allowed);
    }

    #[test]
    fn test_stale_now_does_not_underflow() {
        // A request that read the clock before the counter was created
        let counter = VisitorCounter::new(1, 1_000);
        let decision = counter.try_acquire(500, 1, WINDOW);
        assert!(decision.allowed);
        assert_eq!(decision.window_start, 1_000);
    }

    #[test]
    fn test_reset_decision_reports_new_window() {
        let decision = RateLimitDecision {
            allowed: true,
            remaining: 4,
            window_start: 1_000,
        };
        assert_eq!(decision.reset_at(WINDOW), WINDOW + 1_000);
        assert_eq!(decision.reset_at(i64::MAX), i64::MAX);
    }

    #[test]
    fn test_display() {
        let counter = VisitorCounter::new(5, 123);
        assert_eq!(counter.to_string(), "5:123");
    }

    #[test]
    fn test_concurrent_acquire_grants_exactly_rate() {
        let counter = VisitorCounter::new(5, 0);
        let allowed = AtomicUsize::new(0);
        let barrier = Barrier::new(100);

        std::thread::scope(|s| {
            for _ in 0..100 {
                s.spawn(|| {
                    barrier.wait();
                    if counter.try_acquire(1, 5, WINDOW).allowed {
                        allowed.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(allowed.load(Ordering::SeqCst), 5);
        assert_eq!(counter.tokens(), 0);
    }

    #[test]
    fn test_concurrent_reset_happens_once() {
        let counter = VisitorCounter::new(10, 0);
        let barrier = Barrier::new(10);

        std::thread::scope(|s| {
            for _ in 0..10 {
                s.spawn(|| {
                    barrier.wait();
                    assert!(counter.try_acquire(WINDOW, 10, WINDOW).allowed);
                });
            }
        });

        // Only the first CAS moves the window; everyone else spends from it
        assert_eq!(counter.last_refill(), WINDOW);
        assert!(counter.tokens() <= 9);
    }
}
