//! Knowledge data model (spec §3 "KnowledgeEntry"/"KnowledgeSubscription").

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{AgentId, EntryId, SubscriptionId};
use crate::value::Value;

/// Append-only knowledge record. Updates produce a new version linked to the
/// predecessor via `parent_entry_id` rather than mutating in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub entry_id: EntryId,
    pub category: String,
    pub content: Value,
    pub tags: Vec<String>,
    pub source_agent_id: AgentId,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub confidence: f64,
    pub metadata: BTreeMap<String, Value>,
    pub content_hash: String,
    pub version: u32,
    pub parent_entry_id: Option<EntryId>,
    pub usage_count: u64,
}

/// Invariant: an inactive subscription never receives deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSubscription {
    pub subscription_id: SubscriptionId,
    pub agent_id: AgentId,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub filters: BTreeMap<String, Value>,
    pub active: bool,
}
