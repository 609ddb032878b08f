//! Domain layer for BioChat
//!
//! Value types for queries, plans, tool calls and conversations, plus the
//! port traits the services depend on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, FatalError};
