use thiserror::Error;
use ymera_types::{ErrorKind, TaskId};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("task {0} not found")]
    NotFound(TaskId),
    #[error("orchestrator is saturated ({active}/{capacity} in flight)")]
    Saturated { active: usize, capacity: usize },
    #[error("invalid task request: {0}")]
    InvalidRequest(String),
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::NotFound(_) => ErrorKind::NotFound,
            OrchestratorError::Saturated { .. } => ErrorKind::Saturated,
            OrchestratorError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

/// What actually went wrong running one attempt of a task, distinct from
/// `OrchestratorError` which covers the submission-time API surface.
#[derive(Debug, Error, Clone)]
pub enum TaskExecError {
    #[error("agent adapter failed: {0}")]
    Adapter(String),
    #[error("task exceeded its timeout")]
    Timeout,
}
