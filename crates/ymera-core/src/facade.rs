//! The programmatic facade (spec §6 table): one method per row, each
//! translating its collaborator crate's local error into the shared
//! `CoreError` so callers (the CLI here, an HTTP layer elsewhere) never
//! match on a crate-specific error type.

use std::collections::BTreeMap;
use std::sync::Arc;

use ymera_agent_manager::{AgentAction, AgentManager, AgentManagerError, ReceiveReportOutcome};
use ymera_discovery::AgentDiscovery;
use ymera_durablelog::DurableLog;
use ymera_eventbus::EventBus;
use ymera_knowledge::KnowledgeFlow;
use ymera_orchestrator::{OrchestratorError, TaskOrchestrator};
use ymera_registry::AgentRegistry;
use ymera_resilience::BreakerRegistry;
use ymera_types::agent::{Agent, AgentReport, HeartbeatMetrics};
use ymera_types::{
    AgentId, ApprovalId, CoreError, EntryId, ExecutionId, SubscriptionId, TaskId, TaskRequest, TaskResult, Value, WorkflowDefinition,
};
use ymera_workflow::{WorkflowEngine, WorkflowError};

fn from_agent_manager(err: AgentManagerError) -> CoreError {
    CoreError::new(err.kind(), err.to_string())
}

fn from_orchestrator(err: OrchestratorError) -> CoreError {
    CoreError::new(err.kind(), err.to_string())
}

fn from_workflow(err: WorkflowError) -> CoreError {
    CoreError::new(err.kind(), err.to_string())
}

/// Wires every component crate into one handle. Owns no state of its own —
/// each operation is a thin dispatch onto the collaborator that actually
/// implements it (spec §6: the facade is a seam, not a subsystem).
pub struct Core {
    pub registry: Arc<AgentRegistry>,
    pub discovery: Arc<AgentDiscovery>,
    pub breakers: Arc<BreakerRegistry>,
    pub orchestrator: Arc<TaskOrchestrator>,
    pub workflow_engine: Arc<WorkflowEngine>,
    pub knowledge: Arc<KnowledgeFlow>,
    pub agent_manager: Arc<AgentManager>,
    pub durable_log: Arc<dyn DurableLog>,
    pub event_bus: Arc<EventBus>,
}

impl Core {
    pub fn new(
        registry: Arc<AgentRegistry>,
        discovery: Arc<AgentDiscovery>,
        breakers: Arc<BreakerRegistry>,
        orchestrator: Arc<TaskOrchestrator>,
        workflow_engine: Arc<WorkflowEngine>,
        knowledge: Arc<KnowledgeFlow>,
        agent_manager: Arc<AgentManager>,
        durable_log: Arc<dyn DurableLog>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            discovery,
            breakers,
            orchestrator,
            workflow_engine,
            knowledge,
            agent_manager,
            durable_log,
            event_bus,
        }
    }

    pub async fn register_agent(
        &self,
        agent_id: AgentId,
        agent_type: impl Into<String>,
        capabilities: Vec<String>,
        config: Value,
        metadata: Value,
    ) -> Result<Agent, CoreError> {
        self.agent_manager
            .register_agent(agent_id, agent_type, capabilities, config, metadata)
            .await
            .map_err(from_agent_manager)
    }

    pub async fn transition_agent(
        &self,
        agent_id: &AgentId,
        action: AgentAction,
        reason: impl Into<String>,
        actor: impl Into<String>,
        approval_token: Option<&str>,
    ) -> Result<Agent, CoreError> {
        self.agent_manager
            .transition_agent(agent_id, action, reason, actor, approval_token)
            .await
            .map_err(from_agent_manager)
    }

    pub async fn receive_report(
        &self,
        agent_id: &AgentId,
        metrics: HeartbeatMetrics,
        issues: AgentReport,
    ) -> Result<ReceiveReportOutcome, CoreError> {
        self.agent_manager.receive_report(agent_id, metrics, issues).await.map_err(from_agent_manager)
    }

    pub async fn submit_task(&self, request: TaskRequest) -> Result<TaskId, CoreError> {
        self.orchestrator.submit(request).await.map_err(from_orchestrator)
    }

    pub fn cancel_task(&self, task_id: TaskId) -> bool {
        self.orchestrator.cancel_task(task_id)
    }

    pub fn get_task_result(&self, task_id: &TaskId) -> Option<TaskResult> {
        self.orchestrator.get_result(task_id)
    }

    pub async fn execute_workflow(&self, definition: WorkflowDefinition, context: BTreeMap<String, Value>) -> Result<ExecutionId, CoreError> {
        self.workflow_engine.execute(definition, context).await.map_err(from_workflow)
    }

    pub async fn cancel_workflow(&self, execution_id: ExecutionId) -> bool {
        self.workflow_engine.cancel(execution_id).await
    }

    pub async fn store_knowledge(
        &self,
        content: Value,
        category: impl Into<String>,
        source_agent_id: AgentId,
        tags: Vec<String>,
        metadata: BTreeMap<String, Value>,
    ) -> Result<EntryId, CoreError> {
        Ok(self.knowledge.store_entry(content, category, source_agent_id, tags, metadata).await)
    }

    pub fn subscribe(&self, agent_id: AgentId, categories: Vec<String>, tags: Vec<String>, filters: BTreeMap<String, Value>) -> SubscriptionId {
        self.knowledge.subscribe(agent_id, categories, tags, filters)
    }

    /// Not in the §6 table directly, but `approve` is the other half of the
    /// two-phase deletion primitive `transition_agent(Delete, ..)` exposes;
    /// carried through so the CLI/HTTP layer can drive both halves.
    pub async fn approve(&self, approval_id: ApprovalId, approved_by: impl Into<String>, token: &str) -> Result<Agent, CoreError> {
        self.agent_manager.approve(approval_id, approved_by, token).await.map_err(from_agent_manager)
    }

    pub fn request_deletion_approval(&self, agent_id: &AgentId, requested_by: impl Into<String>, ttl_seconds: i64) -> (ApprovalId, String) {
        self.agent_manager.request_deletion_approval(agent_id, requested_by, ttl_seconds)
    }
}
