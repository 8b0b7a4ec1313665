//! Agent Manager (C6): front door for agent-originated traffic — lifecycle
//! delegation to the registry, approval-gated deletion, threat detection on
//! reports, and admin-directed task assignment.

pub mod approval;
pub mod error;
pub mod manager;
pub mod threat;

pub use approval::{ApprovalCheck, ApprovalStore, PendingApproval};
pub use error::AgentManagerError;
pub use manager::{AgentAction, AgentManager, ReceiveReportOutcome};
pub use threat::{Directive, Threat, ThreatSeverity};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ymera_discovery::AgentDiscovery;
    use ymera_durablelog::InMemoryDurableLog;
    use ymera_eventbus::EventBus;
    use ymera_knowledge::KnowledgeFlow;
    use ymera_orchestrator::{BackpressureMode, InMemoryAgentAdapter, MockOutcome, OrchestratorConfig, TaskOrchestrator};
    use ymera_registry::{AgentRegistry, RegistryConfig};
    use ymera_resilience::{BreakerRegistry, CircuitBreakerConfig};
    use ymera_types::clock::FixedClock;
    use ymera_types::{AgentId, AgentState, TaskPriority, TaskStatus, Value};

    struct Harness {
        manager: Arc<AgentManager>,
        registry: Arc<AgentRegistry>,
        orchestrator: Arc<TaskOrchestrator>,
        adapter: Arc<InMemoryAgentAdapter>,
        log: Arc<InMemoryDurableLog>,
        clock: FixedClock,
    }

    fn harness() -> Harness {
        let clock = FixedClock::new(chrono::Utc::now());
        let bus = Arc::new(EventBus::new(64));
        let registry = Arc::new(AgentRegistry::with_clock(RegistryConfig::default(), bus.clone(), Arc::new(clock.clone())));
        let discovery = Arc::new(AgentDiscovery::new(registry.clone()));
        let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default()));
        let adapter = Arc::new(InMemoryAgentAdapter::new());

        let mut config = OrchestratorConfig::default();
        config.backpressure_mode = BackpressureMode::Block;
        let orchestrator = TaskOrchestrator::with_clock(config, registry.clone(), discovery, breakers, adapter.clone(), bus.clone(), Arc::new(clock.clone()));
        orchestrator.start();

        let knowledge = Arc::new(KnowledgeFlow::with_clock(bus, Arc::new(clock.clone())));
        let log = Arc::new(InMemoryDurableLog::new());

        let manager = AgentManager::with_clock(registry.clone(), orchestrator.clone(), knowledge, log.clone(), Arc::new(clock.clone()));

        Harness {
            manager,
            registry,
            orchestrator,
            adapter,
            log,
            clock,
        }
    }

    async fn registered_and_active(h: &Harness, id: &str) -> AgentId {
        let agent_id = AgentId::new(id);
        h.manager
            .register_agent(agent_id.clone(), "worker", vec!["echo".into()], Value::Null, Value::Null)
            .await
            .unwrap();
        h.manager.activate(&agent_id, "startup", "system").await.unwrap();
        agent_id
    }

    #[tokio::test]
    async fn register_then_activate_reaches_active_and_writes_audit_entries() {
        let h = harness();
        let agent_id = registered_and_active(&h, "a1").await;

        let agent = h.registry.get(&agent_id).unwrap();
        assert_eq!(agent.state, AgentState::Active);
        let events: Vec<_> = h.log.records().iter().map(|r| r.event_type.clone()).collect();
        assert!(events.contains(&"agent.registered".to_string()));
        assert!(events.contains(&"agent.activate".to_string()));
    }

    #[tokio::test]
    async fn delete_without_a_token_is_approval_required() {
        let h = harness();
        let agent_id = registered_and_active(&h, "a1").await;
        h.manager.deactivate(&agent_id, "shutting down", "admin1").await.unwrap();

        let err = h.manager.delete_agent(&agent_id, "cleanup", "admin2", "bogus-token").await.unwrap_err();
        assert!(matches!(err, AgentManagerError::ApprovalRequired));
    }

    #[tokio::test]
    async fn delete_with_a_valid_token_from_request_deletion_approval_succeeds() {
        let h = harness();
        let agent_id = registered_and_active(&h, "a1").await;
        h.manager.deactivate(&agent_id, "shutting down", "admin1").await.unwrap();

        let (_approval_id, token) = h.manager.request_deletion_approval(&agent_id, "admin1", 3600);
        let agent = h.manager.delete_agent(&agent_id, "cleanup", "admin2", &token).await.unwrap();
        assert_eq!(agent.state, AgentState::Deleted);
    }

    #[tokio::test]
    async fn approve_distinguishes_wrong_token_from_no_pending_approval() {
        let h = harness();
        let agent_id = registered_and_active(&h, "a1").await;
        h.manager.deactivate(&agent_id, "shutting down", "admin1").await.unwrap();

        let (approval_id, _token) = h.manager.request_deletion_approval(&agent_id, "admin1", 3600);
        let wrong = h.manager.approve(approval_id, "admin2", "wrong-token").await.unwrap_err();
        assert!(matches!(wrong, AgentManagerError::InvalidRequest(_)));

        let missing = h
            .manager
            .approve(ymera_types::ApprovalId::new(), "admin2", "whatever")
            .await
            .unwrap_err();
        assert!(matches!(missing, AgentManagerError::ApprovalRequired));
    }

    #[tokio::test]
    async fn a_critical_threat_auto_isolates_the_agent_and_returns_directives() {
        let h = harness();
        let agent_id = registered_and_active(&h, "a1").await;

        let report = ymera_types::agent::AgentReport {
            failed_auth_attempts: 10,
            ..Default::default()
        };
        let outcome = h
            .manager
            .receive_report(&agent_id, ymera_types::agent::HeartbeatMetrics::default(), report)
            .await
            .unwrap();

        assert_eq!(outcome.threats.len(), 1);
        assert_eq!(outcome.directives[0].action, "isolate");
        assert_eq!(h.registry.get(&agent_id).unwrap().state, AgentState::Isolated);
    }

    #[tokio::test]
    async fn assign_task_routes_straight_to_the_named_agent_without_discovery() {
        let h = harness();
        let agent_id = registered_and_active(&h, "a1").await;
        let other = registered_and_active(&h, "a2").await;
        h.adapter.queue_outcome(agent_id.clone(), "summarize", MockOutcome::Success(Value::String("done".into())));

        let task_id = h
            .manager
            .assign_task(&agent_id, "summarize", Value::String("payload".into()), TaskPriority::High, None)
            .await
            .unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            loop {
                if let Some(result) = h.orchestrator.get_result(&task_id) {
                    return result;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.agent_id, Some(agent_id));
        assert_eq!(h.adapter.call_count(&other, "summarize"), 0);
    }

    #[tokio::test]
    async fn suspend_with_a_duration_records_the_expiry_but_does_not_auto_reactivate() {
        let h = harness();
        let agent_id = registered_and_active(&h, "a1").await;

        h.manager.suspend(&agent_id, "cooldown", "admin1", Some(chrono::Duration::seconds(60))).await.unwrap();
        assert_eq!(h.registry.get(&agent_id).unwrap().state, AgentState::Suspended);

        h.clock.advance(chrono::Duration::seconds(120));
        assert_eq!(h.registry.get(&agent_id).unwrap().state, AgentState::Suspended);

        let events: Vec<_> = h.log.records().iter().map(|r| r.event_type.clone()).collect();
        assert!(events.contains(&"agent.suspended_until".to_string()));
    }

    #[tokio::test]
    async fn assign_task_to_an_unknown_agent_is_not_found() {
        let h = harness();
        let err = h
            .manager
            .assign_task(&AgentId::new("ghost"), "summarize", Value::Null, TaskPriority::Normal, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentManagerError::AgentNotFound(_)));
    }
}
