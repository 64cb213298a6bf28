//! Rate limiting logic and state management.

mod clock;
mod counter;
mod limiter;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{RateLimitDecision, VisitorCounter};
pub use limiter::RateLimiter;
pub use sweeper::{spawn_sweeper, DEFAULT_CLEANUP_INTERVAL};
