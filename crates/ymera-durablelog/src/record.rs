use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ymera_types::Value;

/// A single `audit_log` row (spec §6 "DurableLog" collaborator). Core
/// never reads these back; they exist for external forensics/replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_type: String,
    pub actor: String,
    pub target: String,
    pub details: Value,
    pub ts: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(event_type: impl Into<String>, actor: impl Into<String>, target: impl Into<String>, details: Value) -> Self {
        Self {
            event_type: event_type.into(),
            actor: actor.into(),
            target: target.into(),
            details,
            ts: Utc::now(),
        }
    }
}
