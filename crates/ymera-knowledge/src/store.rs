//! Entry CRUD for the Knowledge Store (spec §4.7): append-only,
//! content-hash deduplication, and predecessor-linked versioning.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use ymera_types::clock::{Clock, SystemClock};
use ymera_types::{AgentId, EntryId, KnowledgeEntry, Value};

use crate::error::KnowledgeError;

/// A query over the store: category, tag, and free-text filters are ANDed
/// together, matching `request_flow`'s "by category, tag, or free-text
/// tokens" query shape.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeQuery {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub text: Option<String>,
    pub limit: Option<usize>,
}

impl KnowledgeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, v: impl Into<String>) -> Self {
        self.category = Some(v.into());
        self
    }

    pub fn tag(mut self, v: impl Into<String>) -> Self {
        self.tag = Some(v.into());
        self
    }

    pub fn text(mut self, v: impl Into<String>) -> Self {
        self.text = Some(v.into());
        self
    }

    pub fn limit(mut self, v: usize) -> Self {
        self.limit = Some(v);
        self
    }
}

pub struct KnowledgeStore {
    entries: DashMap<EntryId, KnowledgeEntry>,
    by_hash: DashMap<String, EntryId>,
    clock: Arc<dyn Clock>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            by_hash: DashMap::new(),
            clock,
        }
    }

    /// Stores `content` under `category`. A content fingerprint match with
    /// an existing entry collapses into it (usage_count increments, no new
    /// version) rather than creating a duplicate — dedup is keyed on content
    /// alone, so the same fact filed under two categories is still one row.
    pub fn store_entry(
        &self,
        content: Value,
        category: impl Into<String>,
        source_agent_id: AgentId,
        tags: Vec<String>,
        metadata: BTreeMap<String, Value>,
    ) -> (EntryId, bool) {
        let hash = content_hash(&content);
        if let Some(existing_id) = self.by_hash.get(&hash).map(|e| *e) {
            if let Some(mut entry) = self.entries.get_mut(&existing_id) {
                entry.usage_count += 1;
            }
            return (existing_id, false);
        }

        let entry = KnowledgeEntry {
            entry_id: EntryId::new(),
            category: category.into(),
            content,
            tags,
            source_agent_id,
            created_at: self.clock.now(),
            confidence: 1.0,
            metadata,
            content_hash: hash.clone(),
            version: 1,
            parent_entry_id: None,
            usage_count: 1,
        };
        let entry_id = entry.entry_id;
        self.entries.insert(entry_id, entry);
        self.by_hash.insert(hash, entry_id);
        (entry_id, true)
    }

    /// Creates a new version row linked to `entry_id` via `parent_entry_id`.
    /// Unlike `store_entry`, an explicit update always produces a new row —
    /// the caller asked for a revision, not a fingerprint match.
    pub fn update_entry(
        &self,
        entry_id: EntryId,
        content: Value,
        tags: Option<Vec<String>>,
        metadata: Option<BTreeMap<String, Value>>,
    ) -> Result<EntryId, KnowledgeError> {
        let parent = self
            .entries
            .get(&entry_id)
            .map(|e| e.clone())
            .ok_or(KnowledgeError::EntryNotFound(entry_id))?;

        let hash = content_hash(&content);
        let new_entry = KnowledgeEntry {
            entry_id: EntryId::new(),
            category: parent.category.clone(),
            content,
            tags: tags.unwrap_or_else(|| parent.tags.clone()),
            source_agent_id: parent.source_agent_id.clone(),
            created_at: self.clock.now(),
            confidence: parent.confidence,
            metadata: metadata.unwrap_or_else(|| parent.metadata.clone()),
            content_hash: hash.clone(),
            version: parent.version + 1,
            parent_entry_id: Some(entry_id),
            usage_count: 1,
        };
        let new_id = new_entry.entry_id;
        self.entries.insert(new_id, new_entry);
        self.by_hash.insert(hash, new_id);
        Ok(new_id)
    }

    pub fn get(&self, entry_id: &EntryId) -> Option<KnowledgeEntry> {
        self.entries.get(entry_id).map(|e| e.clone())
    }

    pub fn query(&self, query: &KnowledgeQuery) -> Vec<KnowledgeEntry> {
        let mut results: Vec<KnowledgeEntry> = self
            .entries
            .iter()
            .map(|e| e.clone())
            .filter(|e| query.category.as_deref().map(|c| c == e.category).unwrap_or(true))
            .filter(|e| query.tag.as_deref().map(|t| e.tags.iter().any(|tag| tag == t)).unwrap_or(true))
            .filter(|e| {
                query
                    .text
                    .as_deref()
                    .map(|text| e.content.canonicalize().to_lowercase().contains(&text.to_lowercase()))
                    .unwrap_or(true)
            })
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        results.truncate(query.limit.unwrap_or(10));
        results
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.canonicalize().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ymera_types::clock::FixedClock;

    fn store() -> KnowledgeStore {
        KnowledgeStore::with_clock(Arc::new(FixedClock::new(chrono::Utc::now())))
    }

    #[test]
    fn identical_content_collapses_into_one_entry_and_bumps_usage_count() {
        let store = store();
        let (first, created_first) = store.store_entry(
            Value::String("the sky is blue".into()),
            "facts",
            AgentId::new("a1"),
            vec![],
            BTreeMap::new(),
        );
        assert!(created_first);

        let (second, created_second) = store.store_entry(
            Value::String("the sky is blue".into()),
            "other-category",
            AgentId::new("a2"),
            vec!["weather".into()],
            BTreeMap::new(),
        );
        assert!(!created_second);
        assert_eq!(first, second);
        assert_eq!(store.get(&first).unwrap().usage_count, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_entry_links_a_new_version_to_its_parent() {
        let store = store();
        let (entry_id, _) = store.store_entry(Value::String("v1".into()), "facts", AgentId::new("a1"), vec![], BTreeMap::new());

        let new_id = store.update_entry(entry_id, Value::String("v2".into()), None, None).unwrap();
        let new_entry = store.get(&new_id).unwrap();

        assert_eq!(new_entry.parent_entry_id, Some(entry_id));
        assert_eq!(new_entry.version, 2);
        assert_eq!(new_entry.category, "facts");
    }

    #[test]
    fn query_filters_by_category_tag_and_text() {
        let store = store();
        store.store_entry(Value::String("rust is fast".into()), "bugfix", AgentId::new("a1"), vec!["rust".into()], BTreeMap::new());
        store.store_entry(
            Value::String("python is slow".into()),
            "bugfix",
            AgentId::new("a1"),
            vec!["python".into()],
            BTreeMap::new(),
        );
        store.store_entry(Value::String("unrelated".into()), "trivia", AgentId::new("a1"), vec![], BTreeMap::new());

        let results = store.query(&KnowledgeQuery::new().category("bugfix").tag("rust"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, Value::String("rust is fast".into()));

        let text_results = store.query(&KnowledgeQuery::new().text("slow"));
        assert_eq!(text_results.len(), 1);
    }
}
