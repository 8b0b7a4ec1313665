use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ymera_eventbus::EventBus;
use ymera_types::agent::{Agent, AgentReport, AgentState, HeartbeatMetrics};
use ymera_types::clock::{Clock, SystemClock};
use ymera_types::{AgentId, Capability, Value};

use crate::error::RegistryError;
use crate::health::ewma_update;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub heartbeat_timeout_seconds: u64,
    pub max_consecutive_failures: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_seconds: 90,
            max_consecutive_failures: 5,
        }
    }
}

/// Authoritative agent registry (C2): lifecycle state machine, capability
/// index, and health/load tracking. Every mutation that changes externally
/// visible state publishes onto the shared event bus; nothing here writes
/// to the durable log directly (spec §4.2/§6: that's a subscriber's job).
pub struct AgentRegistry {
    agents: DashMap<AgentId, Agent>,
    capability_index: DashMap<Capability, DashSet<AgentId>>,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
}

impl AgentRegistry {
    pub fn new(config: RegistryConfig, event_bus: Arc<EventBus>) -> Self {
        Self::with_clock(config, event_bus, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RegistryConfig, event_bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            agents: DashMap::new(),
            capability_index: DashMap::new(),
            config,
            clock,
            event_bus,
        }
    }

    pub fn register(
        &self,
        agent_id: AgentId,
        agent_type: impl Into<String>,
        capabilities: Vec<Capability>,
        config: Value,
        metadata: Value,
    ) -> Result<Agent, RegistryError> {
        if let Some(existing) = self.agents.get(&agent_id) {
            if !existing.state.is_terminal() {
                return Err(RegistryError::AlreadyExists(agent_id));
            }
        }

        let agent = Agent::new(agent_id.clone(), agent_type, capabilities.clone(), config, metadata, self.clock.now());
        self.agents.insert(agent_id.clone(), agent.clone());

        for capability in &capabilities {
            self.capability_index
                .entry(capability.clone())
                .or_default()
                .insert(agent_id.clone());
        }

        info!(agent_id = %agent_id, "agent registered");
        self.publish("agent.registered", &agent_id, Value::map());
        Ok(agent)
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<Agent> {
        self.agents.get(agent_id).map(|a| a.clone())
    }

    pub fn transition(
        &self,
        agent_id: &AgentId,
        new_state: AgentState,
        reason: impl Into<String>,
        actor: impl Into<String>,
    ) -> Result<Agent, RegistryError> {
        let reason = reason.into();
        let actor = actor.into();
        let mut entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::NotFound(agent_id.clone()))?;

        let from = entry.state;
        if !from.can_transition_to(new_state) {
            return Err(RegistryError::InvalidTransition {
                agent_id: agent_id.clone(),
                from,
                to: new_state,
            });
        }
        entry.state = new_state;
        let snapshot = entry.clone();
        drop(entry);

        if new_state == AgentState::Deleted {
            self.remove_from_capability_index(agent_id, &snapshot.capabilities);
        }

        if from != new_state {
            info!(agent_id = %agent_id, ?from, to = ?new_state, %reason, %actor, "agent transitioned");
            let mut details = std::collections::BTreeMap::new();
            details.insert("from".to_string(), Value::String(format!("{from:?}")));
            details.insert("to".to_string(), Value::String(format!("{new_state:?}")));
            details.insert("reason".to_string(), Value::String(reason));
            details.insert("actor".to_string(), Value::String(actor));
            self.publish("agent.state_changed", agent_id, Value::Map(details));
        }
        Ok(snapshot)
    }

    pub fn heartbeat(&self, agent_id: &AgentId, metrics: HeartbeatMetrics) -> Result<Agent, RegistryError> {
        let mut entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::NotFound(agent_id.clone()))?;
        entry.last_heartbeat_at = self.clock.now();
        entry.health_score = ewma_update(entry.health_score, &metrics);
        let snapshot = entry.clone();
        drop(entry);
        self.publish("agent.presence.update", agent_id, Value::map());
        Ok(snapshot)
    }

    pub fn increment_load(&self, agent_id: &AgentId) -> Result<u64, RegistryError> {
        let mut entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::NotFound(agent_id.clone()))?;
        entry.load += 1;
        Ok(entry.load)
    }

    pub fn decrement_load(&self, agent_id: &AgentId) -> Result<u64, RegistryError> {
        let mut entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::NotFound(agent_id.clone()))?;
        if entry.load == 0 {
            warn!(agent_id = %agent_id, "decrement_load called at zero load, clamping");
            return Ok(0);
        }
        entry.load -= 1;
        Ok(entry.load)
    }

    pub fn record_failure(&self, agent_id: &AgentId) -> Result<Agent, RegistryError> {
        let should_degrade = {
            let mut entry = self
                .agents
                .get_mut(agent_id)
                .ok_or_else(|| RegistryError::NotFound(agent_id.clone()))?;
            entry.failure_count += 1;
            entry.consecutive_failures += 1;
            entry.consecutive_failures >= self.config.max_consecutive_failures && entry.state.is_available()
        };

        if should_degrade {
            return self.transition(agent_id, AgentState::Degraded, "max_consecutive_failures_exceeded", "system");
        }
        self.get(agent_id).ok_or_else(|| RegistryError::NotFound(agent_id.clone()))
    }

    pub fn record_success(&self, agent_id: &AgentId) -> Result<Agent, RegistryError> {
        let mut entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::NotFound(agent_id.clone()))?;
        entry.consecutive_failures = 0;
        Ok(entry.clone())
    }

    /// Record an operational report (spec §4.6 threat detection input); the
    /// registry just stores nothing beyond updating the heartbeat clock —
    /// threat rules are evaluated by the agent manager, not here.
    pub fn touch(&self, agent_id: &AgentId, _report: &AgentReport) -> Result<(), RegistryError> {
        let mut entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::NotFound(agent_id.clone()))?;
        entry.last_heartbeat_at = self.clock.now();
        Ok(())
    }

    pub fn find_by_capability(&self, capability: &str, min_health: f64, exclude_states: &[AgentState]) -> Vec<Agent> {
        let Some(ids) = self.capability_index.get(capability) else {
            return Vec::new();
        };

        let mut matches: Vec<Agent> = ids
            .iter()
            .filter_map(|id| self.agents.get(id.key()).map(|a| a.clone()))
            .filter(|agent| agent.state.is_available())
            .filter(|agent| !exclude_states.contains(&agent.state))
            .filter(|agent| agent.health_score >= min_health)
            .collect();

        matches.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        matches
    }

    /// Transitions any ACTIVE/IDLE/BUSY agent whose heartbeat is older than
    /// `heartbeat_timeout_seconds` to ISOLATED (spec §4.2 background sweep).
    pub fn sweep_stale_heartbeats(&self) -> Vec<AgentId> {
        let timeout = chrono::Duration::seconds(self.config.heartbeat_timeout_seconds as i64);
        let now = self.clock.now();
        let stale: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|entry| entry.state.is_available() && now - entry.last_heartbeat_at > timeout)
            .map(|entry| entry.agent_id.clone())
            .collect();

        let mut isolated = Vec::new();
        for agent_id in stale {
            if self
                .transition(&agent_id, AgentState::Isolated, "heartbeat_timeout", "system")
                .is_ok()
            {
                isolated.push(agent_id);
            }
        }
        isolated
    }

    /// All registered agents, sorted by id for stable CLI/listing output.
    pub fn all(&self) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self.agents.iter().map(|entry| entry.clone()).collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Drops `agent_id` from every capability's index entry, and the entry
    /// itself once it's empty, so a deleted agent's id can never surface
    /// from `find_by_capability` again — required before the id is free to
    /// be reused by a later `register` with a different capability set.
    fn remove_from_capability_index(&self, agent_id: &AgentId, capabilities: &[Capability]) {
        for capability in capabilities {
            if let Some(mut ids) = self.capability_index.get_mut(capability) {
                ids.remove(agent_id);
                if ids.is_empty() {
                    drop(ids);
                    self.capability_index.remove(capability);
                }
            }
        }
    }

    /// Publishes fire-and-forget onto the event bus. A no-op outside a
    /// Tokio runtime (plain unit tests exercising the synchronous registry
    /// API directly) since there is nowhere to spawn the publish onto.
    fn publish(&self, topic: &str, agent_id: &AgentId, mut payload: Value) {
        if let Value::Map(ref mut map) = payload {
            map.insert("agent_id".to_string(), Value::String(agent_id.to_string()));
        }
        let bus = self.event_bus.clone();
        let topic = topic.to_string();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                bus.publish(topic, payload).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ymera_types::clock::FixedClock;

    fn new_registry() -> (AgentRegistry, FixedClock) {
        let clock = FixedClock::new(chrono::Utc::now());
        let bus = Arc::new(EventBus::new(16));
        let registry = AgentRegistry::with_clock(RegistryConfig::default(), bus, Arc::new(clock.clone()));
        (registry, clock)
    }

    #[test]
    fn register_is_idempotent_by_agent_id_unless_deleted() {
        let (registry, _clock) = new_registry();
        let id = AgentId::new("a1");
        registry.register(id.clone(), "worker", vec!["summarize".into()], Value::Null, Value::Null).unwrap();

        let err = registry
            .register(id.clone(), "worker", vec!["summarize".into()], Value::Null, Value::Null)
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));
    }

    #[test]
    fn find_by_capability_respects_min_health_and_state() {
        let (registry, _clock) = new_registry();
        let id = AgentId::new("a1");
        registry.register(id.clone(), "worker", vec!["summarize".into()], Value::Null, Value::Null).unwrap();
        registry.transition(&id, AgentState::Active, "startup", "system").unwrap();

        let found = registry.find_by_capability("summarize", 0.5, &[]);
        assert_eq!(found.len(), 1);

        let found_high_bar = registry.find_by_capability("summarize", 0.99, &[]);
        assert!(found_high_bar.is_empty());
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let (registry, _clock) = new_registry();
        let id = AgentId::new("a1");
        registry.register(id.clone(), "worker", vec![], Value::Null, Value::Null).unwrap();

        let err = registry.transition(&id, AgentState::Suspended, "x", "system").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
    }

    #[test]
    fn record_failure_degrades_after_threshold() {
        let (registry, _clock) = new_registry();
        let id = AgentId::new("a1");
        registry.register(id.clone(), "worker", vec![], Value::Null, Value::Null).unwrap();
        registry.transition(&id, AgentState::Active, "startup", "system").unwrap();

        for _ in 0..5 {
            registry.record_failure(&id).unwrap();
        }

        let agent = registry.get(&id).unwrap();
        assert_eq!(agent.state, AgentState::Degraded);
    }

    #[test]
    fn decrement_load_clamps_at_zero() {
        let (registry, _clock) = new_registry();
        let id = AgentId::new("a1");
        registry.register(id.clone(), "worker", vec![], Value::Null, Value::Null).unwrap();

        let load = registry.decrement_load(&id).unwrap();
        assert_eq!(load, 0);
    }

    #[test]
    fn deletion_removes_the_agent_from_every_capability_index() {
        let (registry, _clock) = new_registry();
        let id = AgentId::new("a1");
        registry.register(id.clone(), "worker", vec!["summarize".into()], Value::Null, Value::Null).unwrap();
        registry.transition(&id, AgentState::Active, "startup", "system").unwrap();
        registry.transition(&id, AgentState::Deactivated, "shutdown", "system").unwrap();
        registry.transition(&id, AgentState::Deleted, "cleanup", "system").unwrap();

        assert!(registry.find_by_capability("summarize", 0.0, &[]).is_empty());

        registry
            .register(id.clone(), "worker", vec!["translate".into()], Value::Null, Value::Null)
            .unwrap();
        registry.transition(&id, AgentState::Active, "startup", "system").unwrap();

        assert!(registry.find_by_capability("summarize", 0.0, &[]).is_empty());
        assert_eq!(registry.find_by_capability("translate", 0.0, &[]).len(), 1);
    }

    #[test]
    fn sweep_isolates_agents_with_stale_heartbeats() {
        let (registry, clock) = new_registry();
        let id = AgentId::new("a1");
        registry.register(id.clone(), "worker", vec![], Value::Null, Value::Null).unwrap();
        registry.transition(&id, AgentState::Active, "startup", "system").unwrap();

        clock.advance(chrono::Duration::seconds(200));
        let isolated = registry.sweep_stale_heartbeats();
        assert_eq!(isolated, vec![id.clone()]);
        assert_eq!(registry.get(&id).unwrap().state, AgentState::Isolated);
    }
}
