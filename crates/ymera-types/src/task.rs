//! Task data model (spec §3 "TaskRequest"/"TaskContext"/"TaskResult").

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{AgentId, Capability, TaskId};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum TaskPriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
    Emergency = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Queued,
    Routing,
    Executing,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    Retrying,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Timeout
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: TaskId,
    pub task_type: String,
    pub capability: Capability,
    pub payload: Value,
    pub priority: TaskPriority,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub requester_id: Option<String>,
    pub parent_task_id: Option<TaskId>,
    pub metadata: BTreeMap<String, Value>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Admin-directed assignment: routes straight to this agent, bypassing
    /// `AgentDiscovery`, while still traveling the queue/breaker/retry path.
    pub forced_agent_id: Option<AgentId>,
}

impl TaskRequest {
    pub fn builder(capability: impl Into<Capability>, now: chrono::DateTime<chrono::Utc>) -> TaskRequestBuilder {
        TaskRequestBuilder {
            task_id: TaskId::new(),
            task_type: String::new(),
            capability: capability.into(),
            payload: Value::Null,
            priority: TaskPriority::Normal,
            timeout_seconds: 300,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            requester_id: None,
            parent_task_id: None,
            metadata: BTreeMap::new(),
            created_at: now,
            forced_agent_id: None,
        }
    }
}

/// Builder mirroring the original's dataclass-with-defaults ergonomics
/// (`TaskRequest` in `task_orchestrator.py`) without a runtime dependency
/// on default-derivation for required fields like `capability`.
pub struct TaskRequestBuilder {
    task_id: TaskId,
    task_type: String,
    capability: Capability,
    payload: Value,
    priority: TaskPriority,
    timeout_seconds: u64,
    max_retries: u32,
    retry_base_delay_ms: u64,
    requester_id: Option<String>,
    parent_task_id: Option<TaskId>,
    metadata: BTreeMap<String, Value>,
    created_at: chrono::DateTime<chrono::Utc>,
    forced_agent_id: Option<AgentId>,
}

impl TaskRequestBuilder {
    pub fn task_type(mut self, v: impl Into<String>) -> Self {
        self.task_type = v.into();
        self
    }
    pub fn payload(mut self, v: Value) -> Self {
        self.payload = v;
        self
    }
    pub fn priority(mut self, v: TaskPriority) -> Self {
        self.priority = v;
        self
    }
    pub fn timeout_seconds(mut self, v: u64) -> Self {
        self.timeout_seconds = v;
        self
    }
    pub fn max_retries(mut self, v: u32) -> Self {
        self.max_retries = v;
        self
    }
    pub fn retry_base_delay_ms(mut self, v: u64) -> Self {
        self.retry_base_delay_ms = v;
        self
    }
    pub fn requester_id(mut self, v: impl Into<String>) -> Self {
        self.requester_id = Some(v.into());
        self
    }
    pub fn parent_task_id(mut self, v: TaskId) -> Self {
        self.parent_task_id = Some(v);
        self
    }
    pub fn forced_agent_id(mut self, v: AgentId) -> Self {
        self.forced_agent_id = Some(v);
        self
    }
    pub fn metadata(mut self, k: impl Into<String>, v: Value) -> Self {
        self.metadata.insert(k.into(), v);
        self
    }
    pub fn build(self) -> TaskRequest {
        TaskRequest {
            task_id: self.task_id,
            task_type: self.task_type,
            capability: self.capability,
            payload: self.payload,
            priority: self.priority,
            timeout_seconds: self.timeout_seconds,
            max_retries: self.max_retries,
            retry_base_delay_ms: self.retry_base_delay_ms,
            requester_id: self.requester_id,
            parent_task_id: self.parent_task_id,
            metadata: self.metadata,
            created_at: self.created_at,
            forced_agent_id: self.forced_agent_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub request: TaskRequest,
    pub status: TaskStatus,
    pub current_agent_id: Option<AgentId>,
    pub retry_count: u32,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_retry_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error_history: Vec<String>,
    pub excluded_agents: Vec<AgentId>,
}

impl TaskContext {
    pub fn new(request: TaskRequest) -> Self {
        Self {
            request,
            status: TaskStatus::Pending,
            current_agent_id: None,
            retry_count: 0,
            started_at: None,
            last_retry_at: None,
            error_history: Vec::new(),
            excluded_agents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub agent_id: Option<AgentId>,
    pub execution_time_ms: Option<u64>,
    pub retries: u32,
}
