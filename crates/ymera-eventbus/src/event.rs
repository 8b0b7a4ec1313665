use chrono::{DateTime, Utc};
use ymera_types::Value;

/// An event posted to a named topic (e.g. `agent.state_changed`,
/// `task.completed`, `knowledge.new`).
#[derive(Debug, Clone)]
pub struct Event {
    pub topic: String,
    pub payload: Value,
    pub published_at: DateTime<Utc>,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            published_at: Utc::now(),
        }
    }
}
