//! Adapters implementing the domain ports.

pub mod cache;
pub mod memory;
pub mod mock;
pub mod sources;
