//! Infrastructure layer
//!
//! Configuration loading, logging setup, retry/rate limiting and the LLM
//! backend.

pub mod config;
pub mod llm;
pub mod logging;
pub mod resilience;
