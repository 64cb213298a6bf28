//! HTTP middleware and server for per-client throttling.

mod identity;
mod layer;
mod server;

pub use identity::{client_identity, UNKNOWN_IDENTITY, X_FORWARDED_FOR};
pub use layer::{
    RateLimitLayer, RateLimitService, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use server::HttpServer;
