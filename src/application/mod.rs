//! Application layer: wires adapters and services into the BioChat pipeline.

pub mod biochat;

pub use biochat::BioChat;
