//! Task Orchestrator (C4): priority queue, fixed worker pool, retry with
//! exponential backoff, timeout, cancellation, and per-agent circuit
//! breaking (spec §4.4).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};
use ymera_discovery::{AgentDiscovery, DiscoveryStrategy};
use ymera_eventbus::EventBus;
use ymera_registry::AgentRegistry;
use ymera_resilience::{BreakerRegistry, CircuitBreakerError};
use ymera_types::clock::{Clock, SystemClock};
use ymera_types::{AgentId, TaskContext, TaskId, TaskRequest, TaskResult, TaskStatus, Value};

use crate::adapter::{AgentAdapter, CancelToken};
use crate::config::{BackpressureMode, OrchestratorConfig};
use crate::error::{OrchestratorError, TaskExecError};
use crate::queue::TaskQueue;

pub struct TaskOrchestrator {
    config: OrchestratorConfig,
    queue: Arc<TaskQueue>,
    active: DashMap<TaskId, TaskContext>,
    completed: DashMap<TaskId, TaskResult>,
    cancel_tokens: DashMap<TaskId, CancelToken>,
    cancel_requested: DashSet<TaskId>,
    permits: DashMap<TaskId, OwnedSemaphorePermit>,
    semaphore: Arc<Semaphore>,
    registry: Arc<AgentRegistry>,
    discovery: Arc<AgentDiscovery>,
    breakers: Arc<BreakerRegistry>,
    adapter: Arc<dyn AgentAdapter>,
    event_bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    workers: SyncMutex<Vec<tokio::task::JoinHandle<()>>>,
    shutdown: CancelToken,
    stopped: AtomicBool,
}

impl TaskOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<AgentRegistry>,
        discovery: Arc<AgentDiscovery>,
        breakers: Arc<BreakerRegistry>,
        adapter: Arc<dyn AgentAdapter>,
        event_bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Self::with_clock(config, registry, discovery, breakers, adapter, event_bus, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: OrchestratorConfig,
        registry: Arc<AgentRegistry>,
        discovery: Arc<AgentDiscovery>,
        breakers: Arc<BreakerRegistry>,
        adapter: Arc<dyn AgentAdapter>,
        event_bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        Arc::new(Self {
            config,
            queue: Arc::new(TaskQueue::new()),
            active: DashMap::new(),
            completed: DashMap::new(),
            cancel_tokens: DashMap::new(),
            cancel_requested: DashSet::new(),
            permits: DashMap::new(),
            semaphore,
            registry,
            discovery,
            breakers,
            adapter,
            event_bus,
            clock,
            workers: SyncMutex::new(Vec::new()),
            shutdown: CancelToken::new(),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn start(self: &Arc<Self>) {
        let mut handles = self.workers.lock();
        for _ in 0..self.config.worker_count {
            let orch = self.clone();
            handles.push(tokio::spawn(async move { orch.worker_loop().await }));
        }
        info!(workers = self.config.worker_count, "task orchestrator started");
    }

    pub async fn shutdown(self: &Arc<Self>) {
        self.stopped.store(true, AtomicOrdering::SeqCst);
        self.shutdown.cancel();
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            let _ = handle.await;
        }
        info!("task orchestrator stopped");
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            match self.queue.try_pop() {
                Some(task_id) => self.execute_task(task_id).await,
                None => {
                    tokio::select! {
                        _ = self.queue.notified() => {}
                        _ = self.shutdown.cancelled() => break,
                    }
                }
            }
            if self.shutdown.is_cancelled() {
                break;
            }
        }
    }

    pub async fn submit(self: &Arc<Self>, request: TaskRequest) -> Result<TaskId, OrchestratorError> {
        if request.capability.is_empty() {
            return Err(OrchestratorError::InvalidRequest("capability must not be empty".into()));
        }

        let permit = self.acquire_permit().await?;

        let task_id = request.task_id;
        let priority = request.priority;
        let context = TaskContext::new(request);
        self.active.insert(task_id, context);
        self.permits.insert(task_id, permit);
        self.queue.push(task_id, priority);
        Ok(task_id)
    }

    pub async fn submit_batch(self: &Arc<Self>, requests: Vec<TaskRequest>) -> Vec<Result<TaskId, OrchestratorError>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.submit(request).await);
        }
        results
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, OrchestratorError> {
        match self.config.backpressure_mode {
            BackpressureMode::Block => Ok(self.semaphore.clone().acquire_owned().await.expect("semaphore never closed")),
            BackpressureMode::RejectWhenSaturated => {
                self.semaphore.clone().try_acquire_owned().map_err(|_| OrchestratorError::Saturated {
                    active: self.config.max_concurrent_tasks - self.semaphore.available_permits(),
                    capacity: self.config.max_concurrent_tasks,
                })
            }
        }
    }

    pub fn cancel_task(&self, task_id: TaskId) -> bool {
        let Some(mut ctx) = self.active.get_mut(&task_id) else {
            return false;
        };

        match ctx.status {
            TaskStatus::Pending | TaskStatus::Queued | TaskStatus::Routing | TaskStatus::Retrying => {
                ctx.status = TaskStatus::Cancelled;
                let retries = ctx.retry_count;
                let agent_id = ctx.current_agent_id.clone();
                drop(ctx);
                self.finalize(task_id, TaskStatus::Cancelled, None, None, agent_id, retries);
                true
            }
            TaskStatus::Executing => {
                if let Some(token) = self.cancel_tokens.get(&task_id) {
                    token.cancel();
                }
                self.cancel_requested.insert(task_id);
                true
            }
            _ => false,
        }
    }

    pub fn get_status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        if let Some(ctx) = self.active.get(task_id) {
            return Some(ctx.status);
        }
        self.completed.get(task_id).map(|r| r.status)
    }

    pub fn get_result(&self, task_id: &TaskId) -> Option<TaskResult> {
        self.completed.get(task_id).map(|r| r.clone())
    }

    pub fn active_task_ids(&self) -> Vec<TaskId> {
        self.active.iter().map(|e| *e.key()).collect()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    async fn execute_task(self: &Arc<Self>, task_id: TaskId) {
        let Some(mut ctx) = self.active.get_mut(&task_id) else {
            return;
        };
        ctx.status = TaskStatus::Routing;
        if ctx.started_at.is_none() {
            ctx.started_at = Some(self.clock.now());
        }
        let request = ctx.request.clone();
        let excluded = ctx.excluded_agents.clone();
        drop(ctx);

        let agent = if let Some(forced) = &request.forced_agent_id {
            match self.registry.get(forced) {
                Some(agent) if !excluded.contains(&agent.agent_id) => Some(agent),
                _ => None,
            }
        } else {
            self.discovery
                .discover(&request.capability, DiscoveryStrategy::LeastLoaded, self.config.discovery_min_health, &excluded)
        };
        let Some(agent) = agent else {
            self.finalize_failed(task_id, None, "no agent available".to_string());
            return;
        };

        {
            let mut ctx = self.active.get_mut(&task_id).expect("context present during execution");
            ctx.current_agent_id = Some(agent.agent_id.clone());
            ctx.status = TaskStatus::Executing;
        }
        let _ = self.registry.increment_load(&agent.agent_id);

        let cancel_token = CancelToken::new();
        self.cancel_tokens.insert(task_id, cancel_token.clone());

        let breaker = self.breakers.get_or_create(&agent.agent_id.0);
        let adapter = self.adapter.clone();
        let payload = request.payload.clone();
        let capability = request.capability.clone();
        let agent_id_for_call = agent.agent_id.clone();
        let timeout = Duration::from_secs(request.timeout_seconds.max(1));

        let outcome = breaker
            .execute(move || async move {
                match tokio::time::timeout(timeout, adapter.invoke(&agent_id_for_call, &capability, payload, timeout, cancel_token)).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(reason)) => Err(TaskExecError::Adapter(reason)),
                    Err(_) => Err(TaskExecError::Timeout),
                }
            })
            .await;

        self.cancel_tokens.remove(&task_id);
        let _ = self.registry.decrement_load(&agent.agent_id);
        let was_cancel_requested = self.cancel_requested.remove(&task_id).is_some();

        match outcome {
            Ok(value) => {
                let _ = self.registry.record_success(&agent.agent_id);
                self.handle_success(task_id, agent.agent_id, value);
            }
            Err(CircuitBreakerError::Open { .. }) => {
                self.handle_circuit_open(task_id, agent.agent_id);
            }
            Err(CircuitBreakerError::Inner(exec_err)) => {
                if was_cancel_requested {
                    let retries = self.active.get(&task_id).map(|c| c.retry_count).unwrap_or(0);
                    self.finalize(task_id, TaskStatus::Cancelled, None, None, Some(agent.agent_id), retries);
                } else {
                    let _ = self.registry.record_failure(&agent.agent_id);
                    self.handle_failure(task_id, agent.agent_id, exec_err.to_string());
                }
            }
        }
    }

    fn handle_circuit_open(self: &Arc<Self>, task_id: TaskId, agent_id: AgentId) {
        let Some(mut ctx) = self.active.get_mut(&task_id) else {
            return;
        };
        ctx.excluded_agents.push(agent_id);
        ctx.status = TaskStatus::Queued;
        let priority = ctx.request.priority;
        drop(ctx);
        warn!(task_id = %task_id, "circuit open, rerouting away from agent without consuming a retry");
        self.queue.push(task_id, priority);
    }

    fn handle_success(self: &Arc<Self>, task_id: TaskId, agent_id: AgentId, value: Value) {
        let Some((_, ctx)) = self.active.remove(&task_id) else {
            return;
        };
        let completed_at = self.clock.now();
        let execution_time_ms = ctx
            .started_at
            .map(|started| (completed_at - started).num_milliseconds().max(0) as u64);

        let result = TaskResult {
            task_id,
            status: TaskStatus::Completed,
            result: Some(value),
            error: None,
            agent_id: Some(agent_id),
            execution_time_ms,
            retries: ctx.retry_count,
        };
        self.completed.insert(task_id, result.clone());
        self.release_permit(&task_id);
        self.publish_task_event("task.completed", &result);
    }

    fn handle_failure(self: &Arc<Self>, task_id: TaskId, agent_id: AgentId, error: String) {
        let Some(mut ctx) = self.active.get_mut(&task_id) else {
            return;
        };
        ctx.error_history.push(error.clone());

        if ctx.retry_count < ctx.request.max_retries {
            ctx.retry_count += 1;
            ctx.status = TaskStatus::Retrying;
            ctx.last_retry_at = Some(self.clock.now());
            let attempt = ctx.retry_count;
            let base_delay_ms = ctx.request.retry_base_delay_ms;
            let priority = ctx.request.priority;
            drop(ctx);

            let delay_ms = base_delay_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(32));
            let queue = self.queue.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                queue.push(task_id, priority);
            });
        } else {
            drop(ctx);
            self.finalize_failed(task_id, Some(agent_id), error);
        }
    }

    fn finalize_failed(self: &Arc<Self>, task_id: TaskId, agent_id: Option<AgentId>, error: String) {
        let retries = self.active.get(&task_id).map(|c| c.retry_count).unwrap_or(0);
        self.finalize(task_id, TaskStatus::Failed, None, Some(error), agent_id, retries);
    }

    fn finalize(
        self: &Arc<Self>,
        task_id: TaskId,
        status: TaskStatus,
        value: Option<Value>,
        error: Option<String>,
        agent_id: Option<AgentId>,
        retries: u32,
    ) {
        self.active.remove(&task_id);
        let result = TaskResult {
            task_id,
            status,
            result: value,
            error,
            agent_id,
            execution_time_ms: None,
            retries,
        };
        self.completed.insert(task_id, result.clone());
        self.release_permit(&task_id);
        let topic = if status == TaskStatus::Completed { "task.completed" } else { "task.failed" };
        self.publish_task_event(topic, &result);
    }

    fn release_permit(&self, task_id: &TaskId) {
        self.permits.remove(task_id);
    }

    fn publish_task_event(self: &Arc<Self>, topic: &str, result: &TaskResult) {
        let mut details = BTreeMap::new();
        details.insert("task_id".to_string(), Value::String(result.task_id.to_string()));
        details.insert("status".to_string(), Value::String(format!("{:?}", result.status)));
        if let Some(agent_id) = &result.agent_id {
            details.insert("agent_id".to_string(), Value::String(agent_id.to_string()));
        }
        if let Some(error) = &result.error {
            details.insert("error".to_string(), Value::String(error.clone()));
        }
        let bus = self.event_bus.clone();
        let topic = topic.to_string();
        let payload = Value::Map(details);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                bus.publish(topic, payload).await;
            });
        }
    }
}
