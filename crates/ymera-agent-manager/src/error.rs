use thiserror::Error;
use ymera_types::{AgentId, ErrorKind};

#[derive(Debug, Error)]
pub enum AgentManagerError {
    #[error("agent {0} not found")]
    AgentNotFound(AgentId),
    #[error("approval required")]
    ApprovalRequired,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Registry(#[from] ymera_registry::RegistryError),
    #[error(transparent)]
    Orchestrator(#[from] ymera_orchestrator::OrchestratorError),
}

impl AgentManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentManagerError::AgentNotFound(_) => ErrorKind::NotFound,
            AgentManagerError::ApprovalRequired => ErrorKind::ApprovalRequired,
            AgentManagerError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            AgentManagerError::Registry(e) => e.kind(),
            AgentManagerError::Orchestrator(e) => e.kind(),
        }
    }
}
