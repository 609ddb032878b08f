//! Retry and rate limiting shared by source and LLM calls.

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::SourceRateLimiter;
pub use retry::{RetryPolicy, Transient};
