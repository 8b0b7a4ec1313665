//! Internal typed pub/sub (C8) binding the registry, discovery, orchestrator,
//! workflow engine, and knowledge store together. Topics are plain strings
//! (`agent.state_changed`, `task.completed`, `task.failed`,
//! `agent.presence.update`, `knowledge.new`); payloads are the shared
//! `Value` blob.

pub mod bus;
pub mod event;

pub use bus::{EventBus, EventHandler, FnHandler, PublishReport};
pub use event::Event;
