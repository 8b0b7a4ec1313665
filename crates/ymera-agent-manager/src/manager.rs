//! Agent Manager (C6): the front door for agent-originated traffic —
//! registration, lifecycle transitions, approval-gated deletion, report
//! ingestion/threat detection, and admin-directed task assignment. Every
//! operation here delegates the state it doesn't own: lifecycle to the
//! registry (C2), execution to the orchestrator (C4), learning to the
//! knowledge flow (C7).

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;
use ymera_durablelog::{append_best_effort, AuditRecord, DurableLog};
use ymera_knowledge::KnowledgeFlow;
use ymera_orchestrator::TaskOrchestrator;
use ymera_registry::AgentRegistry;
use ymera_types::agent::{Agent, AgentReport, AgentState, HeartbeatMetrics};
use ymera_types::clock::{Clock, SystemClock};
use ymera_types::{AgentId, ApprovalId, TaskId, TaskPriority, TaskRequest, Value};

use crate::approval::{ApprovalCheck, ApprovalStore, PendingApproval};
use crate::error::AgentManagerError;
use crate::threat::{self, Directive, Threat};

/// Lifecycle actions the façade's single `transition_agent` op dispatches
/// on. Only `Delete` is approval-gated — it's the only action the state
/// machine requires a token for (spec §3 "Agent" invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAction {
    Activate,
    Deactivate,
    Suspend,
    Freeze,
    Isolate,
    Delete,
}

impl AgentAction {
    fn target_state(self) -> AgentState {
        match self {
            AgentAction::Activate => AgentState::Active,
            AgentAction::Deactivate => AgentState::Deactivated,
            AgentAction::Suspend => AgentState::Suspended,
            AgentAction::Freeze => AgentState::Frozen,
            AgentAction::Isolate => AgentState::Isolated,
            AgentAction::Delete => AgentState::Deleted,
        }
    }

    fn requires_approval(self) -> bool {
        matches!(self, AgentAction::Delete)
    }

    fn label(self) -> &'static str {
        match self {
            AgentAction::Activate => "activate",
            AgentAction::Deactivate => "deactivate",
            AgentAction::Suspend => "suspend",
            AgentAction::Freeze => "freeze",
            AgentAction::Isolate => "isolate",
            AgentAction::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReceiveReportOutcome {
    pub threats: Vec<Threat>,
    pub directives: Vec<Directive>,
}

pub struct AgentManager {
    registry: Arc<AgentRegistry>,
    orchestrator: Arc<TaskOrchestrator>,
    knowledge: Arc<KnowledgeFlow>,
    log: Arc<dyn DurableLog>,
    clock: Arc<dyn Clock>,
    approvals: ApprovalStore,
}

impl AgentManager {
    pub fn new(
        registry: Arc<AgentRegistry>,
        orchestrator: Arc<TaskOrchestrator>,
        knowledge: Arc<KnowledgeFlow>,
        log: Arc<dyn DurableLog>,
    ) -> Arc<Self> {
        Self::with_clock(registry, orchestrator, knowledge, log, Arc::new(SystemClock))
    }

    pub fn with_clock(
        registry: Arc<AgentRegistry>,
        orchestrator: Arc<TaskOrchestrator>,
        knowledge: Arc<KnowledgeFlow>,
        log: Arc<dyn DurableLog>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            orchestrator,
            knowledge,
            log,
            approvals: ApprovalStore::new(clock.clone()),
            clock,
        })
    }

    /// Thin wrapper over the registry plus an audit entry — no config
    /// persistence beyond what the registry already stores, since
    /// `Agent.config` is part of its authoritative record (spec §3).
    pub async fn register_agent(
        &self,
        agent_id: AgentId,
        agent_type: impl Into<String>,
        capabilities: Vec<String>,
        config: Value,
        metadata: Value,
    ) -> Result<Agent, AgentManagerError> {
        let agent = self.registry.register(agent_id.clone(), agent_type, capabilities, config, metadata)?;
        append_best_effort(self.log.as_ref(), AuditRecord::new("agent.registered", "system", agent_id.to_string(), Value::Null)).await;
        Ok(agent)
    }

    /// The façade's single lifecycle op. `Delete` requires `approval_token`
    /// to match a live, unexpired pending approval for `agent_id`; any
    /// other failure mode (missing, wrong, expired) surfaces uniformly as
    /// `ApprovalRequired` here — the finer-grained "wrong token" signal is
    /// reserved for `approve`, the two-admin primitive below.
    pub async fn transition_agent(
        &self,
        agent_id: &AgentId,
        action: AgentAction,
        reason: impl Into<String>,
        actor: impl Into<String>,
        approval_token: Option<&str>,
    ) -> Result<Agent, AgentManagerError> {
        let reason = reason.into();
        let actor = actor.into();

        if action.requires_approval() {
            self.approvals
                .redeem_for_target(agent_id, approval_token)
                .map_err(|_| AgentManagerError::ApprovalRequired)?;
        }

        let agent = self.registry.transition(agent_id, action.target_state(), reason.clone(), actor.clone())?;
        append_best_effort(
            self.log.as_ref(),
            AuditRecord::new(format!("agent.{}", action.label()), actor, agent_id.to_string(), Value::String(reason)),
        )
        .await;
        Ok(agent)
    }

    pub async fn activate(&self, agent_id: &AgentId, reason: impl Into<String>, actor: impl Into<String>) -> Result<Agent, AgentManagerError> {
        self.transition_agent(agent_id, AgentAction::Activate, reason, actor, None).await
    }

    pub async fn deactivate(&self, agent_id: &AgentId, reason: impl Into<String>, actor: impl Into<String>) -> Result<Agent, AgentManagerError> {
        self.transition_agent(agent_id, AgentAction::Deactivate, reason, actor, None).await
    }

    pub async fn freeze(&self, agent_id: &AgentId, reason: impl Into<String>, actor: impl Into<String>) -> Result<Agent, AgentManagerError> {
        self.transition_agent(agent_id, AgentAction::Freeze, reason, actor, None).await
    }

    pub async fn isolate(&self, agent_id: &AgentId, reason: impl Into<String>, actor: impl Into<String>) -> Result<Agent, AgentManagerError> {
        self.transition_agent(agent_id, AgentAction::Isolate, reason, actor, None).await
    }

    /// `duration` is recorded on the audit trail only — no background sweep
    /// reactivates a suspended agent automatically. Spec §4.2 names exactly
    /// one background sweep (the registry's stale-heartbeat timeout); a
    /// second timer for suspension expiry isn't specified, so reactivation
    /// after a suspension stays an explicit `activate` call.
    pub async fn suspend(
        &self,
        agent_id: &AgentId,
        reason: impl Into<String>,
        actor: impl Into<String>,
        duration: Option<chrono::Duration>,
    ) -> Result<Agent, AgentManagerError> {
        let reason = reason.into();
        let actor = actor.into();
        let agent = self.transition_agent(agent_id, AgentAction::Suspend, reason.clone(), actor.clone(), None).await?;
        if let Some(duration) = duration {
            let until = self.clock.now() + duration;
            append_best_effort(
                self.log.as_ref(),
                AuditRecord::new("agent.suspended_until", actor, agent_id.to_string(), Value::String(until.to_rfc3339())),
            )
            .await;
        }
        Ok(agent)
    }

    /// Convenience wrapper named to match spec §4.6's `delete_agent` call
    /// shape; identical to `transition_agent(.., Delete, .., Some(token))`.
    pub async fn delete_agent(
        &self,
        agent_id: &AgentId,
        reason: impl Into<String>,
        actor: impl Into<String>,
        approval_token: &str,
    ) -> Result<Agent, AgentManagerError> {
        self.transition_agent(agent_id, AgentAction::Delete, reason, actor, Some(approval_token)).await
    }

    /// First half of the two-phase approval: mints a pending record and a
    /// raw token, returned once to the requester to hand to a second admin
    /// out of band. Only `delete_agent` is wired as an executable action.
    pub fn request_deletion_approval(&self, agent_id: &AgentId, requested_by: impl Into<String>, ttl_seconds: i64) -> (ApprovalId, String) {
        self.approvals.request("delete_agent", agent_id.clone(), requested_by, ttl_seconds)
    }

    /// Second half: a second admin redeems the token directly against the
    /// approval record (rather than re-presenting it to `delete_agent`),
    /// executing the deletion atomically on success. A wrong token reports
    /// `InvalidRequest`; a missing or expired one reports `ApprovalRequired`
    /// — matching the two distinguished outcomes in the worked example.
    pub async fn approve(&self, approval_id: ApprovalId, approved_by: impl Into<String>, token: &str) -> Result<Agent, AgentManagerError> {
        let approved_by = approved_by.into();
        let record: PendingApproval = match self.approvals.redeem(&approval_id, token) {
            Ok(record) => record,
            Err(ApprovalCheck::WrongToken) => return Err(AgentManagerError::InvalidRequest("approval token mismatch".into())),
            Err(ApprovalCheck::Missing) | Err(ApprovalCheck::Expired) => return Err(AgentManagerError::ApprovalRequired),
        };

        let agent = self.registry.transition(&record.target, AgentState::Deleted, "approved deletion", approved_by.clone())?;
        append_best_effort(
            self.log.as_ref(),
            AuditRecord::new("agent.deleted", approved_by, record.target.to_string(), Value::Null),
        )
        .await;
        Ok(agent)
    }

    /// Updates C2 health/presence, evaluates threat rules, publishes the
    /// outcome to C7 for learning, and isolates the agent automatically on
    /// a critical threat (spec §4.6).
    pub async fn receive_report(
        &self,
        agent_id: &AgentId,
        metrics: HeartbeatMetrics,
        report: AgentReport,
    ) -> Result<ReceiveReportOutcome, AgentManagerError> {
        self.registry.get(agent_id).ok_or_else(|| AgentManagerError::AgentNotFound(agent_id.clone()))?;
        self.registry.heartbeat(agent_id, metrics)?;
        self.registry.touch(agent_id, &report)?;

        let threats = threat::evaluate(&report);
        let directives = threat::directives_for(&threats);

        if threat::has_critical(&threats) {
            warn!(agent_id = %agent_id, threats = threats.len(), "critical threat detected, isolating agent");
            // Already-isolated or otherwise ineligible agents simply stay put.
            let _ = self.registry.transition(agent_id, AgentState::Isolated, "critical threat detected", "system");
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("agent_id".to_string(), Value::String(agent_id.to_string()));
        self.knowledge
            .store_entry(threats_to_value(&threats), "agent_reports", agent_id.clone(), vec!["threat-report".into()], metadata)
            .await;

        append_best_effort(
            self.log.as_ref(),
            AuditRecord::new("agent.report_received", agent_id.to_string(), agent_id.to_string(), Value::Int(threats.len() as i64)),
        )
        .await;

        Ok(ReceiveReportOutcome { threats, directives })
    }

    /// Admin-directed assignment: routes straight to `agent_id` via
    /// `TaskRequest.forced_agent_id`, bypassing discovery, while still
    /// traveling the queue/breaker/retry path in C4. `task_type` doubles as
    /// the routing capability — an admin naming a specific agent has
    /// already decided what it's capable of, so there's no separate
    /// capability parameter to supply.
    pub async fn assign_task(
        &self,
        agent_id: &AgentId,
        task_type: impl Into<String>,
        payload: Value,
        priority: TaskPriority,
        deadline: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<TaskId, AgentManagerError> {
        self.registry.get(agent_id).ok_or_else(|| AgentManagerError::AgentNotFound(agent_id.clone()))?;

        let task_type = task_type.into();
        let now = self.clock.now();
        let mut builder = TaskRequest::builder(task_type.clone(), now)
            .task_type(task_type)
            .payload(payload)
            .priority(priority)
            .forced_agent_id(agent_id.clone());
        if let Some(deadline) = deadline {
            let seconds = (deadline - now).num_seconds().max(1) as u64;
            builder = builder.timeout_seconds(seconds);
        }
        let request = builder.build();
        let task_id = request.task_id;
        self.orchestrator.submit(request).await?;
        Ok(task_id)
    }
}

fn threats_to_value(threats: &[Threat]) -> Value {
    Value::List(
        threats
            .iter()
            .map(|t| {
                let mut map = BTreeMap::new();
                map.insert("rule".to_string(), Value::String(t.rule.clone()));
                map.insert("severity".to_string(), Value::String(format!("{:?}", t.severity)));
                map.insert("description".to_string(), Value::String(t.description.clone()));
                Value::Map(map)
            })
            .collect(),
    )
}
