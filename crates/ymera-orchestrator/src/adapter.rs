//! `AgentAdapter`: the only transport-aware external collaborator (spec §6).
//! The core treats it as opaque — `invoke` is the single seam across which
//! a real deployment would speak HTTP, gRPC, or an in-process call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;
use ymera_types::{AgentId, Capability, Value};

/// Cooperative cancellation signal threaded through `invoke`. Orchestrator
/// cancellation of an EXECUTING task notifies this; honoring it promptly
/// is the adapter's responsibility (spec §4.4: "required to honor within
/// the task's timeout").
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves immediately if already cancelled, otherwise waits.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
pub trait AgentAdapter: Send + Sync {
    async fn invoke(
        &self,
        agent_id: &AgentId,
        capability: &Capability,
        payload: Value,
        deadline: Duration,
        cancel: CancelToken,
    ) -> Result<Value, String>;
}

/// In-process test double. Responses are registered per `(agent_id,
/// capability)`; unregistered pairs echo the payload back so tests don't
/// need to stub every call site.
#[derive(Default)]
pub struct InMemoryAgentAdapter {
    responses: DashMap<(AgentId, Capability), Vec<MockOutcome>>,
    calls: DashMap<(AgentId, Capability), u64>,
}

#[derive(Clone)]
pub enum MockOutcome {
    Success(Value),
    Failure(String),
    Timeout,
    Cancellable,
}

impl InMemoryAgentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next `invoke` of `(agent_id, capability)`;
    /// outcomes are consumed FIFO, so a flaky-then-recovers agent can be
    /// modeled with `[Failure, Failure, Success]`.
    pub fn queue_outcome(&self, agent_id: AgentId, capability: impl Into<Capability>, outcome: MockOutcome) {
        self.responses.entry((agent_id, capability.into())).or_default().push(outcome);
    }

    pub fn call_count(&self, agent_id: &AgentId, capability: &str) -> u64 {
        self.calls.get(&(agent_id.clone(), capability.to_string())).map(|v| *v).unwrap_or(0)
    }
}

#[async_trait]
impl AgentAdapter for InMemoryAgentAdapter {
    async fn invoke(
        &self,
        agent_id: &AgentId,
        capability: &Capability,
        payload: Value,
        deadline: Duration,
        cancel: CancelToken,
    ) -> Result<Value, String> {
        let key = (agent_id.clone(), capability.clone());
        *self.calls.entry(key.clone()).or_insert(0) += 1;

        let outcome = self
            .responses
            .get_mut(&key)
            .and_then(|mut queue| if queue.is_empty() { None } else { Some(queue.remove(0)) })
            .unwrap_or(MockOutcome::Success(payload.clone()));

        match outcome {
            MockOutcome::Success(value) => Ok(value),
            MockOutcome::Failure(reason) => Err(reason),
            MockOutcome::Timeout => {
                tokio::time::sleep(deadline + Duration::from_secs(1)).await;
                Ok(payload)
            }
            MockOutcome::Cancellable => {
                cancel.cancelled().await;
                Err("cancelled".to_string())
            }
        }
    }
}
