//! In-process typed pub/sub (C8). Each subscriber gets its own bounded
//! inbox and dedicated task, so slow consumers never block publishers or
//! other subscribers; delivery is fire-and-forget per spec.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{trace, warn};
use ymera_types::{SubscriptionId, Value};

use crate::event::Event;

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event);
}

/// Adapts a plain closure into an `EventHandler`, for tests and simple
/// in-process wiring that doesn't need a named type.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(Event) + Send + Sync,
{
    async fn handle(&self, event: Event) {
        (self.0)(event);
    }
}

struct Subscriber {
    id: SubscriptionId,
    name: String,
    tx: mpsc::Sender<Event>,
}

/// Outcome of a single `publish` call across all subscribers of the topic.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

pub struct EventBus {
    subscribers: DashMap<String, Vec<Subscriber>>,
    default_inbox_capacity: usize,
    events_published: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(default_inbox_capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            default_inbox_capacity,
            events_published: AtomicU64::new(0),
        }
    }

    /// Subscribe to `topic`, spawning a dedicated task that drains this
    /// subscriber's inbox in order and hands each event to `handler`.
    pub fn subscribe(&self, topic: impl Into<String>, name: impl Into<String>, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        self.subscribe_with_capacity(topic, name, handler, self.default_inbox_capacity)
    }

    pub fn subscribe_with_capacity(
        &self,
        topic: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        inbox_capacity: usize,
    ) -> SubscriptionId {
        let topic = topic.into();
        let name = name.into();
        let id = SubscriptionId::new();
        let (tx, mut rx) = mpsc::channel(inbox_capacity.max(1));

        let task_name = name.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler.handle(event).await;
            }
            trace!(subscriber = %task_name, "event bus subscriber inbox closed");
        });

        self.subscribers
            .entry(topic)
            .or_default()
            .push(Subscriber { id, name, tx });
        id
    }

    pub fn unsubscribe(&self, topic: &str, subscription_id: SubscriptionId) {
        if let Some(mut subs) = self.subscribers.get_mut(topic) {
            subs.retain(|s| s.id != subscription_id);
        }
    }

    /// Publish `payload` on `topic`. Fire-and-forget: a subscriber whose
    /// inbox is full has the event dropped, logged, and does not block
    /// delivery to any other subscriber.
    pub async fn publish(&self, topic: impl Into<String>, payload: Value) -> PublishReport {
        let topic = topic.into();
        let event = Event::new(topic.clone(), payload);
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let mut report = PublishReport::default();
        let Some(subs) = self.subscribers.get(&topic) else {
            return report;
        };

        for sub in subs.iter() {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    report.dropped += 1;
                    warn!(subscriber = %sub.name, topic = %topic, "event bus inbox full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    report.dropped += 1;
                }
            }
        }
        report
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.get(topic).map(|s| s.len()).unwrap_or(0)
    }

    pub fn total_events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
