use thiserror::Error;
use ymera_types::{AgentId, AgentState, ErrorKind};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent '{0}' already registered")]
    AlreadyExists(AgentId),
    #[error("agent '{0}' not found")]
    NotFound(AgentId),
    #[error("agent '{agent_id}' cannot transition from {from:?} to {to:?}")]
    InvalidTransition {
        agent_id: AgentId,
        from: AgentState,
        to: AgentState,
    },
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }
}
