//! Result caching adapters.

pub mod result_cache;

pub use result_cache::ResultCache;
