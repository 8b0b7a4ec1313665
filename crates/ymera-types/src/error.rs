//! Shared error taxonomy (spec §7 "Error handling design"). Every crate's
//! own error enum carries a variant that maps onto one of these kinds so
//! the facade in `ymera-core` can translate consistently to exit codes /
//! responses without matching on each crate's concrete error type.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    AlreadyExists,
    InvalidTransition,
    ApprovalRequired,
    Saturated,
    CircuitOpen,
    Timeout,
    DependencyFailure,
    Internal,
}

impl ErrorKind {
    /// Whether a caller retrying the identical request might succeed later
    /// without any corrective action on their part.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Saturated | ErrorKind::CircuitOpen | ErrorKind::Timeout | ErrorKind::DependencyFailure
        )
    }
}

/// A `CoreError` wraps any crate-local error with the shared kind plus a
/// correlation id, so a failure can be traced across the task/workflow/
/// agent boundary it crossed (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub correlation_id: Option<String>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.correlation_id {
            Some(id) => write!(f, "[{:?}] {} (correlation_id={id})", self.kind, self.message),
            None => write!(f, "[{:?}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for CoreError {}
