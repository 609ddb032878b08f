//! Source connectors: the generic HTTP connector, the built-in catalog and the registry.

pub mod catalog;
pub mod http;
pub mod registry;

pub use http::{FollowUp, HttpJsonConnector, RequestParts, SourceDefinition};
pub use registry::SourceRegistry;
