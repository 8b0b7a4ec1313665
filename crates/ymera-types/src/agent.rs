//! Agent lifecycle state machine (spec §3, §4.2 transition table).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{AgentId, Capability};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    Initializing,
    Active,
    Busy,
    Idle,
    Degraded,
    Suspended,
    Frozen,
    Isolated,
    Deactivated,
    Deleted,
}

impl AgentState {
    /// Whether the agent is eligible for discovery / new task assignment.
    pub fn is_available(&self) -> bool {
        matches!(self, AgentState::Active | AgentState::Idle)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Deleted)
    }

    /// Allowed destination states from this source state, per spec §4.2.
    /// `DELETED` is reachable only from `DEACTIVATED`, and only through the
    /// approval-gated path (enforced by the caller, not by this table).
    pub fn allowed_transitions(&self) -> &'static [AgentState] {
        use AgentState::*;
        match self {
            Initializing => &[Active, Deactivated],
            Active | Idle | Busy => &[Degraded, Suspended, Frozen, Isolated, Deactivated],
            Degraded => &[Active, Isolated, Deactivated],
            Suspended => &[Active, Deactivated],
            Frozen => &[Active, Deactivated],
            Isolated => &[Active, Deactivated],
            Deactivated => &[Deleted],
            Deleted => &[],
        }
    }

    /// `transition(A→B); transition(B→B)` is a no-op, not an error (spec §8).
    pub fn can_transition_to(&self, target: AgentState) -> bool {
        *self == target || self.allowed_transitions().contains(&target)
    }
}

/// Authoritative agent record, owned by the Registry (spec §3 "Agent").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub agent_type: String,
    pub capabilities: Vec<Capability>,
    pub state: AgentState,
    pub health_score: f64,
    pub load: u64,
    pub last_heartbeat_at: chrono::DateTime<chrono::Utc>,
    pub config: Value,
    pub metadata: Value,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub registered_at: chrono::DateTime<chrono::Utc>,
}

impl Agent {
    pub fn new(
        agent_id: AgentId,
        agent_type: impl Into<String>,
        capabilities: Vec<Capability>,
        config: Value,
        metadata: Value,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            agent_id,
            agent_type: agent_type.into(),
            capabilities,
            state: AgentState::Initializing,
            health_score: 1.0,
            load: 0,
            last_heartbeat_at: now,
            config,
            metadata,
            failure_count: 0,
            consecutive_failures: 0,
            registered_at: now,
        }
    }
}

/// Metrics reported on an agent heartbeat (spec §4.2 `heartbeat`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatMetrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub error_rate: f64,
    pub response_time_ms: f64,
}

/// Operational report from an agent, feeding threat detection (spec §4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentReport {
    pub operations_per_minute: f64,
    pub failed_auth_attempts: u64,
    pub outbound_data_mb: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub api_requests_per_minute: f64,
    pub issues: Vec<String>,
    pub data: BTreeMap<String, Value>,
}
