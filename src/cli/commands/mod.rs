//! CLI command implementations.

pub mod ask;
pub mod inspect;
