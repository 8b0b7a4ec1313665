//! Task Orchestrator (C4): priority queue, fixed worker pool, retries with
//! exponential backoff, timeouts, cancellation, and per-agent circuit
//! breaking on top of discovery and the registry.

pub mod adapter;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod queue;

pub use adapter::{AgentAdapter, CancelToken, InMemoryAgentAdapter, MockOutcome};
pub use config::{BackpressureMode, OrchestratorConfig};
pub use error::{OrchestratorError, TaskExecError};
pub use orchestrator::TaskOrchestrator;
pub use queue::TaskQueue;
