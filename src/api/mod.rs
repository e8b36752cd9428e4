//! API Layer Module
//!
//! HTTP server, LNURL-withdraw handlers and middleware.

pub mod handlers;
pub mod middleware;
pub mod server;

// Re-exports for convenience
pub use middleware::{create_rate_limiter, RateLimitConfig, RateLimitState, RateLimiter};
pub use server::{create_router, start_server, AppState, SharedAppState};
