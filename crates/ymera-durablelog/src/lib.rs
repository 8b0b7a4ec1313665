//! `DurableLog`: the audit/event persistence collaborator named in spec §6.
//! Core treats it as fire-and-forget — a failed append is logged but never
//! fails the caller's operation, since loss-of-log is explicitly non-fatal.

pub mod postgres;
pub mod record;

use async_trait::async_trait;
use thiserror::Error;

pub use record::AuditRecord;

#[derive(Debug, Error)]
pub enum DurableLogError {
    #[error("durable log unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DurableLog: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), DurableLogError>;
}

/// Appends `record` via `log`, swallowing failures into a warning per the
/// "loss-of-log is logged but non-fatal" rule — callers that want the audit
/// write to be best-effort (which is all of them) should use this instead
/// of matching on the `Result` themselves.
pub async fn append_best_effort(log: &dyn DurableLog, record: AuditRecord) {
    if let Err(err) = log.append(record).await {
        tracing::warn!(error = %err, "audit append failed, continuing without it");
    }
}

/// In-memory test double. Retains every record for assertions.
#[derive(Default)]
pub struct InMemoryDurableLog {
    records: parking_lot::Mutex<Vec<AuditRecord>>,
}

impl InMemoryDurableLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl DurableLog for InMemoryDurableLog {
    async fn append(&self, record: AuditRecord) -> Result<(), DurableLogError> {
        self.records.lock().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ymera_types::Value;

    #[tokio::test]
    async fn in_memory_log_retains_appended_records_in_order() {
        let log = InMemoryDurableLog::new();
        log.append(AuditRecord::new("agent.registered", "system", "agent-1", Value::Null))
            .await
            .unwrap();
        log.append(AuditRecord::new("agent.transitioned", "system", "agent-1", Value::Null))
            .await
            .unwrap();

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, "agent.registered");
        assert_eq!(records[1].event_type, "agent.transitioned");
    }

    struct FailingLog;

    #[async_trait]
    impl DurableLog for FailingLog {
        async fn append(&self, _record: AuditRecord) -> Result<(), DurableLogError> {
            Err(DurableLogError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn best_effort_append_swallows_failures() {
        let log = FailingLog;
        append_best_effort(&log, AuditRecord::new("x", "y", "z", Value::Null)).await;
    }
}
