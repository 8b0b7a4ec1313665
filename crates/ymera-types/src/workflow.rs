//! Workflow data model (spec §3 "WorkflowDefinition"/"WorkflowStep"/
//! "WorkflowExecution").

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{Capability, ExecutionId, StepId, TaskId};
use crate::task::TaskPriority;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowOnFailure {
    Fail,
    Continue,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOnFailure {
    Fail,
    Skip,
    Retry,
}

/// A small declarative predicate language over the shared workflow context
/// map, standing in for the original's arbitrary Python callback (spec §9
/// "Exception-based flow" / "Coroutine control flow" redesign hints favor a
/// first-class, serializable result/expression over ambient closures).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Exists(String),
    Equals(String, Value),
    NotEquals(String, Value),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn evaluate(&self, context: &BTreeMap<String, Value>) -> bool {
        match self {
            Condition::Exists(key) => context.contains_key(key),
            Condition::Equals(key, expected) => context.get(key) == Some(expected),
            Condition::NotEquals(key, expected) => context.get(key) != Some(expected),
            Condition::And(conds) => conds.iter().all(|c| c.evaluate(context)),
            Condition::Or(conds) => conds.iter().any(|c| c.evaluate(context)),
            Condition::Not(c) => !c.evaluate(context),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_id: StepId,
    pub capability: Capability,
    pub payload: Value,
    pub dependencies: Vec<StepId>,
    pub timeout_seconds: u64,
    pub retry_count: u32,
    pub retry_base_delay_ms: u64,
    pub on_failure: StepOnFailure,
    pub condition: Option<Condition>,
    /// Capability invoked for best-effort compensation when the owning
    /// workflow's `on_failure = ROLLBACK` unwinds a completed step.
    pub compensation_capability: Option<Capability>,
}

impl WorkflowStep {
    pub fn new(step_id: impl Into<StepId>, capability: impl Into<Capability>) -> Self {
        Self {
            step_id: step_id.into(),
            capability: capability.into(),
            payload: Value::Null,
            dependencies: Vec::new(),
            timeout_seconds: 300,
            retry_count: 3,
            retry_base_delay_ms: 1000,
            on_failure: StepOnFailure::Fail,
            condition: None,
            compensation_capability: None,
        }
    }

    pub fn depends_on(mut self, step_id: impl Into<StepId>) -> Self {
        self.dependencies.push(step_id.into());
        self
    }

    pub fn on_failure(mut self, v: StepOnFailure) -> Self {
        self.on_failure = v;
        self
    }

    pub fn retry_base_delay_ms(mut self, v: u64) -> Self {
        self.retry_base_delay_ms = v;
        self
    }

    pub fn condition(mut self, c: Condition) -> Self {
        self.condition = Some(c);
        self
    }

    pub fn compensation(mut self, capability: impl Into<Capability>) -> Self {
        self.compensation_capability = Some(capability.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub workflow_id: String,
    pub steps: Vec<WorkflowStep>,
    pub priority: TaskPriority,
    pub timeout_seconds: u64,
    pub on_failure: WorkflowOnFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub step: WorkflowStep,
    pub status: StepStatus,
    pub task_id: Option<TaskId>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub retries: u32,
    /// Set when this step is `Skipped` because its own attempt failed and
    /// its `on_failure = SKIP` swallowed that failure for readiness
    /// purposes. A condition-skip (dependency unmet, `condition` false)
    /// leaves this `false` — only a failure-skip must still count against
    /// the workflow's own `on_failure` outcome.
    pub skipped_due_to_failure: bool,
}

impl StepExecution {
    pub fn new(step: WorkflowStep) -> Self {
        Self {
            step,
            status: StepStatus::Pending,
            task_id: None,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            retries: 0,
            skipped_due_to_failure: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub execution_id: ExecutionId,
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub steps: BTreeMap<StepId, StepExecution>,
    pub context: BTreeMap<String, Value>,
    pub priority: TaskPriority,
    pub timeout_seconds: u64,
    pub on_failure: WorkflowOnFailure,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
}

impl WorkflowExecution {
    pub fn new(definition: &WorkflowDefinition, context: BTreeMap<String, Value>, now: chrono::DateTime<chrono::Utc>) -> Self {
        let steps = definition
            .steps
            .iter()
            .map(|step| (step.step_id.clone(), StepExecution::new(step.clone())))
            .collect();
        Self {
            execution_id: ExecutionId::new(),
            workflow_id: definition.workflow_id.clone(),
            status: WorkflowStatus::Pending,
            steps,
            context,
            priority: definition.priority,
            timeout_seconds: definition.timeout_seconds,
            on_failure: definition.on_failure,
            started_at: now,
            completed_at: None,
            error: None,
        }
    }
}
