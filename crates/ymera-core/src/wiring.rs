//! Constructs a fully wired `Core` from a `YmeraConfig`, the way
//! `orchestration/src/main.rs` assembles its executor, trackers, and
//! backends before starting the execution loop. The only two seams this
//! crate leaves open are `AgentAdapter` and `DurableLog` (spec §6) — every
//! other collaborator is constructed here.

use std::sync::Arc;

use ymera_agent_manager::AgentManager;
use ymera_discovery::AgentDiscovery;
use ymera_durablelog::{DurableLog, InMemoryDurableLog};
use ymera_eventbus::EventBus;
use ymera_knowledge::KnowledgeFlow;
use ymera_orchestrator::{AgentAdapter, InMemoryAgentAdapter, TaskOrchestrator};
use ymera_registry::AgentRegistry;
use ymera_resilience::BreakerRegistry;
use ymera_workflow::WorkflowEngine;

use ymera_config::YmeraConfig;

use crate::facade::Core;

const EVENT_BUS_CAPACITY: usize = 1024;

/// Wires every collaborator against the given config, `adapter`, and
/// `durable_log`, and starts the orchestrator's worker pool and the
/// workflow engine's monitoring loop. Returned `Core` is ready to serve
/// the facade the moment this returns.
pub fn build(config: &YmeraConfig, adapter: Arc<dyn AgentAdapter>, durable_log: Arc<dyn DurableLog>) -> Core {
    let event_bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));
    let registry = Arc::new(AgentRegistry::new(config.registry.clone(), event_bus.clone()));
    let discovery = Arc::new(AgentDiscovery::new(registry.clone()));
    let breakers = Arc::new(BreakerRegistry::new(config.circuit_breaker.clone()));

    let orchestrator = TaskOrchestrator::new(
        config.orchestrator.clone(),
        registry.clone(),
        discovery.clone(),
        breakers.clone(),
        adapter,
        event_bus.clone(),
    );
    orchestrator.start();

    let workflow_engine = WorkflowEngine::new(orchestrator.clone(), event_bus.clone());
    workflow_engine.start();

    let knowledge = Arc::new(KnowledgeFlow::new(event_bus.clone()));
    let agent_manager = AgentManager::new(registry.clone(), orchestrator.clone(), knowledge.clone(), durable_log.clone());

    Core::new(
        registry,
        discovery,
        breakers,
        orchestrator,
        workflow_engine,
        knowledge,
        agent_manager,
        durable_log,
        event_bus,
    )
}

/// Wires a `Core` against the in-process test doubles for both collaborator
/// seams. Used by the binary when no real adapter/log has been configured,
/// and by the integration tests covering spec §8's end-to-end scenarios.
pub fn build_in_memory(config: &YmeraConfig) -> (Core, Arc<InMemoryAgentAdapter>, Arc<InMemoryDurableLog>) {
    let adapter = Arc::new(InMemoryAgentAdapter::new());
    let durable_log = Arc::new(InMemoryDurableLog::new());
    let core = build(config, adapter.clone(), durable_log.clone());
    (core, adapter, durable_log)
}
