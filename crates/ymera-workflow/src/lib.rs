//! Workflow Engine (C5): composes Task Orchestrator submissions into
//! DAG-scheduled, multi-step executions with skip-cascading, rollback
//! compensation, and deadline monitoring.

pub mod dag;
pub mod engine;
pub mod error;

pub use dag::{reverse_topological_order, validate_acyclic};
pub use engine::WorkflowEngine;
pub use error::WorkflowError;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use ymera_discovery::AgentDiscovery;
    use ymera_eventbus::EventBus;
    use ymera_orchestrator::{BackpressureMode, InMemoryAgentAdapter, MockOutcome, OrchestratorConfig, TaskOrchestrator};
    use ymera_registry::{AgentRegistry, RegistryConfig};
    use ymera_resilience::{BreakerRegistry, CircuitBreakerConfig};
    use ymera_types::clock::FixedClock;
    use ymera_types::{
        AgentId, AgentState, StepOnFailure, StepStatus, TaskPriority, Value, WorkflowDefinition, WorkflowOnFailure, WorkflowStatus,
        WorkflowStep,
    };

    struct Harness {
        engine: Arc<WorkflowEngine>,
        registry: Arc<AgentRegistry>,
        adapter: Arc<InMemoryAgentAdapter>,
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
        let orchestrator = TaskOrchestrator::with_clock(
            config,
            registry.clone(),
            discovery,
            breakers,
            adapter.clone(),
            bus.clone(),
            Arc::new(clock.clone()),
        );
        orchestrator.start();

        let engine = WorkflowEngine::with_clock(orchestrator, bus, Arc::new(clock.clone()));
        engine.start();

        Harness {
            engine,
            registry,
            adapter,
            clock,
        }
    }

    fn register_agent(registry: &AgentRegistry, id: &str, capabilities: &[&str]) -> AgentId {
        let agent_id = AgentId::new(id);
        registry
            .register(agent_id.clone(), "worker", capabilities.iter().map(|c| c.to_string()).collect(), Value::Null, Value::Null)
            .unwrap();
        registry.transition(&agent_id, AgentState::Active, "startup", "system").unwrap();
        agent_id
    }

    fn def(workflow_id: &str, steps: Vec<WorkflowStep>, on_failure: WorkflowOnFailure) -> WorkflowDefinition {
        WorkflowDefinition {
            workflow_id: workflow_id.to_string(),
            steps,
            priority: TaskPriority::Normal,
            timeout_seconds: 60,
            on_failure,
        }
    }

    async fn wait_for_status(engine: &WorkflowEngine, execution_id: ymera_types::ExecutionId, status: WorkflowStatus) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if engine.get_status(&execution_id) == Some(status) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("workflow never reached {status:?}"));
    }

    #[tokio::test]
    async fn runs_a_simple_linear_workflow_to_completion() {
        let h = harness();
        register_agent(&h.registry, "a1", &["step_a", "step_b"]);

        let steps = vec![WorkflowStep::new("a", "step_a"), WorkflowStep::new("b", "step_b").depends_on("a")];
        let execution_id = h.engine.execute(def("linear", steps, WorkflowOnFailure::Fail), BTreeMap::new()).await.unwrap();

        wait_for_status(&h.engine, execution_id, WorkflowStatus::Completed).await;
        let exec = h.engine.get_execution(&execution_id).unwrap();
        assert_eq!(exec.steps.get("a").unwrap().status, StepStatus::Completed);
        assert_eq!(exec.steps.get("b").unwrap().status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn skip_cascades_through_dependents_of_a_skipped_step() {
        let h = harness();
        register_agent(&h.registry, "a1", &["step_a", "step_b", "step_c", "step_d"]);
        h.adapter.queue_outcome(AgentId::new("a1"), "step_c", MockOutcome::Failure("boom".into()));
        h.adapter.queue_outcome(AgentId::new("a1"), "step_c", MockOutcome::Failure("boom".into()));
        h.adapter.queue_outcome(AgentId::new("a1"), "step_c", MockOutcome::Failure("boom".into()));
        h.adapter.queue_outcome(AgentId::new("a1"), "step_c", MockOutcome::Failure("boom".into()));

        let steps = vec![
            WorkflowStep::new("a", "step_a"),
            WorkflowStep::new("b", "step_b").depends_on("a"),
            WorkflowStep::new("c", "step_c").depends_on("a").on_failure(StepOnFailure::Skip).retry_base_delay_ms(2),
            WorkflowStep::new("d", "step_d").depends_on("b").depends_on("c"),
        ];
        let execution_id = h.engine.execute(def("diamond", steps, WorkflowOnFailure::Continue), BTreeMap::new()).await.unwrap();

        wait_for_status(&h.engine, execution_id, WorkflowStatus::Completed).await;
        let exec = h.engine.get_execution(&execution_id).unwrap();
        assert_eq!(exec.steps.get("c").unwrap().status, StepStatus::Skipped);
        assert_eq!(exec.steps.get("d").unwrap().status, StepStatus::Skipped);
        assert_eq!(exec.steps.get("b").unwrap().status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn a_failed_step_blocking_all_remaining_work_deadlocks_the_workflow() {
        let h = harness();
        register_agent(&h.registry, "a1", &["step_a", "step_b"]);
        for _ in 0..4 {
            h.adapter.queue_outcome(AgentId::new("a1"), "step_a", MockOutcome::Failure("down".into()));
        }

        let steps = vec![
            WorkflowStep::new("a", "step_a").retry_base_delay_ms(2),
            WorkflowStep::new("b", "step_b").depends_on("a"),
        ];
        let execution_id = h.engine.execute(def("blocked", steps, WorkflowOnFailure::Fail), BTreeMap::new()).await.unwrap();

        wait_for_status(&h.engine, execution_id, WorkflowStatus::Failed).await;
        let exec = h.engine.get_execution(&execution_id).unwrap();
        assert_eq!(exec.steps.get("a").unwrap().status, StepStatus::Failed);
        assert_eq!(exec.steps.get("b").unwrap().status, StepStatus::Pending);
        assert_eq!(exec.error.as_deref(), Some("deadlock — unmet dependencies"));
    }

    #[tokio::test]
    async fn cancelling_a_workflow_cancels_its_in_flight_step_task() {
        let h = harness();
        let agent_id = register_agent(&h.registry, "a1", &["step_a"]);
        h.adapter.queue_outcome(agent_id.clone(), "step_a", MockOutcome::Cancellable);

        let steps = vec![WorkflowStep::new("a", "step_a")];
        let execution_id = h.engine.execute(def("cancel-me", steps, WorkflowOnFailure::Fail), BTreeMap::new()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if h.engine.get_status(&execution_id) == Some(WorkflowStatus::Running)
                    && h.engine.get_execution(&execution_id).unwrap().steps.get("a").unwrap().status == StepStatus::Running
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("step a never started running");

        assert!(h.engine.cancel(execution_id).await);
        assert_eq!(h.engine.get_status(&execution_id), Some(WorkflowStatus::Cancelled));
        let _ = h.clock.now();
    }
}
