use thiserror::Error;
use ymera_types::{ErrorKind, ExecutionId};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),
    #[error("workflow execution {0} not found")]
    NotFound(ExecutionId),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::InvalidDefinition(_) => ErrorKind::InvalidRequest,
            WorkflowError::NotFound(_) => ErrorKind::NotFound,
        }
    }
}
