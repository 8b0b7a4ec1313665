//! Workflow Engine (C5): DAG scheduler that composes multiple Task
//! Orchestrator submissions into one execution (spec §4.5).

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use tracing::{info, warn};
use ymera_eventbus::EventBus;
use ymera_orchestrator::{CancelToken, TaskOrchestrator};
use ymera_types::clock::{Clock, SystemClock};
use ymera_types::{
    ExecutionId, StepId, StepOnFailure, StepStatus, TaskRequest, TaskStatus, Value, WorkflowDefinition, WorkflowExecution,
    WorkflowOnFailure, WorkflowStatus,
};

use crate::dag::{reverse_topological_order, validate_acyclic};
use crate::error::WorkflowError;

const MONITOR_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

pub struct WorkflowEngine {
    orchestrator: Arc<TaskOrchestrator>,
    active: DashMap<ExecutionId, WorkflowExecution>,
    completed: DashMap<ExecutionId, WorkflowExecution>,
    templates: DashMap<String, WorkflowDefinition>,
    event_bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    shutdown: CancelToken,
    monitor: SyncMutex<Option<tokio::task::JoinHandle<()>>>,
}

enum RoundOutcome {
    Ready(Vec<StepId>),
    Done,
    Deadlock,
}

impl WorkflowEngine {
    pub fn new(orchestrator: Arc<TaskOrchestrator>, event_bus: Arc<EventBus>) -> Arc<Self> {
        Self::with_clock(orchestrator, event_bus, Arc::new(SystemClock))
    }

    pub fn with_clock(orchestrator: Arc<TaskOrchestrator>, event_bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            active: DashMap::new(),
            completed: DashMap::new(),
            templates: DashMap::new(),
            event_bus,
            clock,
            shutdown: CancelToken::new(),
            monitor: SyncMutex::new(None),
        })
    }

    pub fn start(self: &Arc<Self>) {
        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.monitor_loop().await });
        *self.monitor.lock() = Some(handle);
        info!("workflow engine started");
    }

    pub async fn stop(self: &Arc<Self>) {
        self.shutdown.cancel();
        let handle = self.monitor.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("workflow engine stopped");
    }

    async fn monitor_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(MONITOR_INTERVAL) => {}
                _ = self.shutdown.cancelled() => return,
            }

            let now = self.clock.now();
            let timed_out: Vec<ExecutionId> = self
                .active
                .iter()
                .filter(|e| (now - e.started_at).num_seconds() as u64 > e.timeout_seconds)
                .map(|e| *e.key())
                .collect();

            for execution_id in timed_out {
                warn!(execution_id = %execution_id, "workflow timed out, cancelling");
                self.cancel_workflow(execution_id).await;
            }
        }
    }

    pub fn register_template(&self, definition: WorkflowDefinition) -> Result<(), WorkflowError> {
        validate_acyclic(&definition)?;
        self.templates.insert(definition.workflow_id.clone(), definition);
        Ok(())
    }

    pub fn get_template(&self, workflow_id: &str) -> Option<WorkflowDefinition> {
        self.templates.get(workflow_id).map(|d| d.clone())
    }

    pub async fn execute_template(
        self: &Arc<Self>,
        workflow_id: &str,
        context: BTreeMap<String, Value>,
    ) -> Result<ExecutionId, WorkflowError> {
        let definition = self
            .get_template(workflow_id)
            .ok_or_else(|| WorkflowError::InvalidDefinition(format!("no such template: {workflow_id}")))?;
        self.execute(definition, context).await
    }

    pub async fn execute(
        self: &Arc<Self>,
        definition: WorkflowDefinition,
        context: BTreeMap<String, Value>,
    ) -> Result<ExecutionId, WorkflowError> {
        validate_acyclic(&definition)?;

        let execution = WorkflowExecution::new(&definition, context, self.clock.now());
        let execution_id = execution.execution_id;
        self.active.insert(execution_id, execution);

        let engine = self.clone();
        tokio::spawn(async move { engine.drive(execution_id).await });

        info!(execution_id = %execution_id, workflow_id = %definition.workflow_id, "workflow execution started");
        Ok(execution_id)
    }

    async fn drive(self: Arc<Self>, execution_id: ExecutionId) {
        {
            let mut exec = self.active.get_mut(&execution_id).expect("execution present");
            exec.status = WorkflowStatus::Running;
        }

        loop {
            if self.is_cancelled(execution_id) {
                return;
            }

            let outcome = {
                let mut exec = self.active.get_mut(&execution_id).expect("execution present");
                self.compute_round(&mut exec)
            };

            match outcome {
                RoundOutcome::Done => break,
                RoundOutcome::Deadlock => {
                    self.finalize(execution_id, WorkflowStatus::Failed, Some("deadlock — unmet dependencies".to_string()))
                        .await;
                    return;
                }
                RoundOutcome::Ready(ready) => {
                    let mut handles = Vec::with_capacity(ready.len());
                    for step_id in ready {
                        let engine = self.clone();
                        handles.push(tokio::spawn(async move { engine.execute_step(execution_id, step_id).await }));
                    }
                    for handle in handles {
                        let _ = handle.await;
                    }

                    let now = self.clock.now();
                    let mut exec = self.active.get_mut(&execution_id).expect("execution present");
                    propagate_skip_cascade(&mut exec, now);
                }
            }
        }

        self.finalize_from_step_outcomes(execution_id).await;
    }

    fn is_cancelled(&self, execution_id: ExecutionId) -> bool {
        self.active.get(&execution_id).map(|e| e.status == WorkflowStatus::Cancelled).unwrap_or(true)
    }

    fn compute_round(&self, exec: &mut WorkflowExecution) -> RoundOutcome {
        let pending: Vec<StepId> = exec
            .steps
            .iter()
            .filter(|(_, se)| se.status == StepStatus::Pending)
            .map(|(id, _)| id.clone())
            .collect();

        if pending.is_empty() {
            return RoundOutcome::Done;
        }

        let now = self.clock.now();
        let mut ready = Vec::new();

        for step_id in pending {
            let deps_met = {
                let se = exec.steps.get(&step_id).unwrap();
                se.step
                    .dependencies
                    .iter()
                    .all(|dep| matches!(exec.steps.get(dep).map(|d| d.status), Some(StepStatus::Completed) | Some(StepStatus::Skipped)))
            };
            if !deps_met {
                continue;
            }

            let condition_passes = {
                let se = exec.steps.get(&step_id).unwrap();
                se.step.condition.as_ref().map(|c| c.evaluate(&exec.context)).unwrap_or(true)
            };

            if !condition_passes {
                let se = exec.steps.get_mut(&step_id).unwrap();
                se.status = StepStatus::Skipped;
                se.completed_at = Some(now);
                continue;
            }

            let se = exec.steps.get_mut(&step_id).unwrap();
            se.status = StepStatus::Running;
            se.started_at = Some(now);
            ready.push(step_id);
        }

        if ready.is_empty() {
            RoundOutcome::Deadlock
        } else {
            RoundOutcome::Ready(ready)
        }
    }

    async fn execute_step(self: Arc<Self>, execution_id: ExecutionId, step_id: StepId) {
        let request = {
            let exec = self.active.get(&execution_id).expect("execution present");
            let se = exec.steps.get(&step_id).expect("step present");

            let mut payload_map = se.step.payload.as_map().cloned().unwrap_or_default();
            payload_map.insert("workflow_context".to_string(), Value::Map(exec.context.clone()));

            let request = TaskRequest::builder(se.step.capability.clone(), self.clock.now())
                .payload(Value::Map(payload_map))
                .priority(exec.priority)
                .timeout_seconds(se.step.timeout_seconds)
                .max_retries(se.step.retry_count)
                .retry_base_delay_ms(se.step.retry_base_delay_ms)
                .metadata("workflow_id", Value::String(exec.workflow_id.clone()))
                .metadata("execution_id", Value::String(execution_id.to_string()))
                .metadata("step_id", Value::String(step_id.clone()))
                .build();
            request
        };

        let task_id = match self.orchestrator.submit(request).await {
            Ok(id) => id,
            Err(err) => {
                self.finish_step(execution_id, &step_id, false, None, Some(err.to_string()));
                return;
            }
        };

        {
            let mut exec = self.active.get_mut(&execution_id).expect("execution present");
            if let Some(se) = exec.steps.get_mut(&step_id) {
                se.task_id = Some(task_id);
            }
        }

        loop {
            if self.is_cancelled(execution_id) {
                self.orchestrator.cancel_task(task_id);
                return;
            }
            if let Some(result) = self.orchestrator.get_result(&task_id) {
                let succeeded = result.status == TaskStatus::Completed;
                self.finish_step(execution_id, &step_id, succeeded, result.result, result.error);
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    /// Records one step's terminal outcome. A failed step whose own
    /// `on_failure = SKIP` is marked SKIPPED rather than FAILED — it counts
    /// as satisfied for its dependents' readiness check, and
    /// `propagate_skip_cascade` then skips those dependents in turn, so a
    /// SKIP never silently "succeeds" downstream with missing data.
    fn finish_step(&self, execution_id: ExecutionId, step_id: &StepId, succeeded: bool, value: Option<Value>, error: Option<String>) {
        let now = self.clock.now();
        let Some(mut exec) = self.active.get_mut(&execution_id) else {
            return;
        };

        let on_failure = exec.steps.get(step_id).map(|se| se.step.on_failure);
        let result_key = format!("step_{step_id}_result");

        let Some(se) = exec.steps.get_mut(step_id) else {
            return;
        };
        se.completed_at = Some(now);
        se.error = error;

        if succeeded {
            se.status = StepStatus::Completed;
            se.result = value.clone();
            if let Some(value) = value {
                exec.context.insert(result_key, value);
            }
        } else if on_failure == Some(StepOnFailure::Skip) {
            se.status = StepStatus::Skipped;
            se.skipped_due_to_failure = true;
        } else {
            se.status = StepStatus::Failed;
        }
    }

    async fn cancel_workflow(self: &Arc<Self>, execution_id: ExecutionId) -> bool {
        let Some(mut exec) = self.active.get_mut(&execution_id) else {
            return false;
        };
        if exec.status.is_terminal_like() {
            return false;
        }
        exec.status = WorkflowStatus::Cancelled;

        let running_tasks: Vec<_> = exec
            .steps
            .values()
            .filter(|se| se.status == StepStatus::Running)
            .filter_map(|se| se.task_id)
            .collect();
        drop(exec);

        for task_id in running_tasks {
            self.orchestrator.cancel_task(task_id);
        }

        info!(execution_id = %execution_id, "workflow cancelled");
        self.move_to_completed(execution_id);
        true
    }

    pub async fn cancel(self: &Arc<Self>, execution_id: ExecutionId) -> bool {
        self.cancel_workflow(execution_id).await
    }

    async fn finalize_from_step_outcomes(self: &Arc<Self>, execution_id: ExecutionId) {
        let (any_failed, on_failure, steps_snapshot) = {
            let exec = self.active.get(&execution_id).expect("execution present");
            let any_failed = exec
                .steps
                .values()
                .any(|se| se.status == StepStatus::Failed || (se.status == StepStatus::Skipped && se.skipped_due_to_failure));
            (any_failed, exec.on_failure, exec.steps.clone())
        };

        if !any_failed {
            self.finalize(execution_id, WorkflowStatus::Completed, None).await;
            return;
        }

        match on_failure {
            WorkflowOnFailure::Fail => {
                self.finalize(execution_id, WorkflowStatus::Failed, Some("one or more steps failed".to_string())).await;
            }
            WorkflowOnFailure::Continue => {
                self.finalize(execution_id, WorkflowStatus::Completed, None).await;
            }
            WorkflowOnFailure::Rollback => {
                self.compensate(execution_id, &steps_snapshot).await;
                self.finalize(execution_id, WorkflowStatus::Failed, Some("rolled back after step failure".to_string())).await;
            }
        }
    }

    async fn compensate(&self, execution_id: ExecutionId, steps: &BTreeMap<StepId, ymera_types::StepExecution>) {
        let order = reverse_topological_order(&steps.values().map(|se| se.step.clone()).collect::<Vec<_>>());

        for step_id in order {
            let Some(se) = steps.get(&step_id) else { continue };
            if se.status != StepStatus::Completed {
                continue;
            }
            let Some(capability) = se.step.compensation_capability.clone() else {
                continue;
            };

            let request = TaskRequest::builder(capability, self.clock.now())
                .payload(se.result.clone().unwrap_or(Value::Null))
                .timeout_seconds(se.step.timeout_seconds)
                .max_retries(0)
                .metadata("execution_id", Value::String(execution_id.to_string()))
                .metadata("compensates_step", Value::String(step_id.clone()))
                .build();

            if let Err(err) = self.orchestrator.submit(request).await {
                warn!(execution_id = %execution_id, step_id = %step_id, error = %err, "compensation submission failed, continuing best-effort");
            }
        }
    }

    async fn finalize(self: &Arc<Self>, execution_id: ExecutionId, status: WorkflowStatus, error: Option<String>) {
        let workflow_id = {
            let Some(mut exec) = self.active.get_mut(&execution_id) else {
                return;
            };
            exec.status = status;
            exec.error = error.clone();
            exec.completed_at = Some(self.clock.now());
            exec.workflow_id.clone()
        };
        self.move_to_completed(execution_id);
        let topic = if status == WorkflowStatus::Completed { "workflow.completed" } else { "workflow.failed" };
        self.publish_workflow_event(topic, execution_id, &workflow_id, error);
    }

    fn publish_workflow_event(self: &Arc<Self>, topic: &str, execution_id: ExecutionId, workflow_id: &str, error: Option<String>) {
        let mut details = BTreeMap::new();
        details.insert("execution_id".to_string(), Value::String(execution_id.to_string()));
        details.insert("workflow_id".to_string(), Value::String(workflow_id.to_string()));
        if let Some(error) = error {
            details.insert("error".to_string(), Value::String(error));
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

    fn move_to_completed(&self, execution_id: ExecutionId) {
        if let Some((_, exec)) = self.active.remove(&execution_id) {
            self.completed.insert(execution_id, exec);
        }
    }

    pub fn get_status(&self, execution_id: &ExecutionId) -> Option<WorkflowStatus> {
        if let Some(exec) = self.active.get(execution_id) {
            return Some(exec.status);
        }
        self.completed.get(execution_id).map(|e| e.status)
    }

    pub fn get_execution(&self, execution_id: &ExecutionId) -> Option<WorkflowExecution> {
        if let Some(exec) = self.active.get(execution_id) {
            return Some(exec.clone());
        }
        self.completed.get(execution_id).map(|e| e.clone())
    }

    pub fn active_execution_ids(&self) -> Vec<ExecutionId> {
        self.active.iter().map(|e| *e.key()).collect()
    }
}

fn propagate_skip_cascade(exec: &mut WorkflowExecution, now: chrono::DateTime<chrono::Utc>) {
    loop {
        let cascading: Vec<StepId> = exec
            .steps
            .iter()
            .filter(|(_, se)| se.status == StepStatus::Pending)
            .filter(|(_, se)| {
                se.step
                    .dependencies
                    .iter()
                    .any(|dep| exec.steps.get(dep).map(|d| d.status == StepStatus::Skipped).unwrap_or(false))
            })
            .map(|(id, _)| id.clone())
            .collect();

        if cascading.is_empty() {
            break;
        }

        for step_id in cascading {
            let se = exec.steps.get_mut(&step_id).unwrap();
            se.status = StepStatus::Skipped;
            se.completed_at = Some(now);
        }
    }
}

trait WorkflowStatusExt {
    fn is_terminal_like(&self) -> bool;
}

impl WorkflowStatusExt for WorkflowStatus {
    fn is_terminal_like(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled)
    }
}
