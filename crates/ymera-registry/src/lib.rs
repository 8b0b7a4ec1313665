//! Agent Registry (C2): the authoritative agent map, lifecycle state
//! machine, capability index, and health/load tracking that C3 (discovery),
//! C4 (orchestrator), and C6 (agent manager) all read from.

pub mod error;
pub mod health;
pub mod registry;

pub use error::RegistryError;
pub use registry::{AgentRegistry, RegistryConfig};
