use thiserror::Error;
use ymera_types::{EntryId, ErrorKind, SubscriptionId};

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("knowledge entry {0} not found")]
    EntryNotFound(EntryId),
    #[error("subscription {0} not found")]
    SubscriptionNotFound(SubscriptionId),
}

impl KnowledgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KnowledgeError::EntryNotFound(_) => ErrorKind::NotFound,
            KnowledgeError::SubscriptionNotFound(_) => ErrorKind::NotFound,
        }
    }
}
