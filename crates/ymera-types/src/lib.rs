//! Shared data model for the YMERA orchestration core: identities, the
//! dynamic `Value` blob, agent/task/workflow records, and the common error
//! kind and clock/rng abstractions every other crate builds on.

pub mod agent;
pub mod clock;
pub mod error;
pub mod ids;
pub mod knowledge;
pub mod task;
pub mod value;
pub mod workflow;

pub use agent::{Agent, AgentReport, AgentState, HeartbeatMetrics};
pub use clock::{Clock, FixedClock, RngSource, SeededRng, SystemClock, SystemRng};
pub use error::{CoreError, ErrorKind};
pub use ids::{AgentId, ApprovalId, Capability, EntryId, ExecutionId, StepId, SubscriptionId, TaskId};
pub use knowledge::{KnowledgeEntry, KnowledgeSubscription};
pub use task::{TaskContext, TaskPriority, TaskRequest, TaskRequestBuilder, TaskResult, TaskStatus};
pub use value::Value;
pub use workflow::{
    Condition, StepExecution, StepOnFailure, StepStatus, WorkflowDefinition, WorkflowExecution,
    WorkflowOnFailure, WorkflowStatus, WorkflowStep,
};
