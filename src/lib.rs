//! Throttle - Per-Client HTTP Rate Limiting
//!
//! This crate implements a fixed-window rate limiter keyed by client
//! identity, exposed as a tower middleware. Per-client counters are updated
//! lock-free with compare-and-swap, and a background sweeper evicts clients
//! that have gone idle.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
