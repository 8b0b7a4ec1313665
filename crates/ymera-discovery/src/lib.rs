//! Agent Discovery (C3): capability-based agent selection over the
//! registry's capability index.

pub mod discovery;
pub mod strategy;

pub use discovery::AgentDiscovery;
pub use strategy::DiscoveryStrategy;
