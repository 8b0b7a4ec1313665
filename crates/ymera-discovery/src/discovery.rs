//! Agent Discovery (C3): picks one eligible agent for a capability using
//! one of four strategies. Eligibility (state ∈ {ACTIVE, IDLE}, health
//! floor) is enforced by `AgentRegistry::find_by_capability`; this module
//! only orders or samples among the returned candidates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use ymera_registry::AgentRegistry;
use ymera_types::agent::Agent;
use ymera_types::clock::{RngSource, SystemRng};
use ymera_types::{AgentId, Capability};

use crate::strategy::DiscoveryStrategy;

pub struct AgentDiscovery {
    registry: Arc<AgentRegistry>,
    round_robin_counters: DashMap<Capability, AtomicU64>,
    rng: Arc<dyn RngSource>,
}

impl AgentDiscovery {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self::with_rng(registry, Arc::new(SystemRng))
    }

    pub fn with_rng(registry: Arc<AgentRegistry>, rng: Arc<dyn RngSource>) -> Self {
        Self {
            registry,
            round_robin_counters: DashMap::new(),
            rng,
        }
    }

    /// Returns `None` when no eligible agent exists; callers treat this as
    /// the recoverable "no agent available" condition (spec §4.3/§4.4).
    pub fn discover(
        &self,
        capability: &str,
        strategy: DiscoveryStrategy,
        min_health: f64,
        exclude: &[AgentId],
    ) -> Option<Agent> {
        let mut candidates = self.registry.find_by_capability(capability, min_health, &[]);
        candidates.retain(|agent| !exclude.contains(&agent.agent_id));
        if candidates.is_empty() {
            return None;
        }

        match strategy {
            DiscoveryStrategy::LeastLoaded => self.pick_least_loaded(candidates),
            DiscoveryStrategy::RoundRobin => self.pick_round_robin(capability, candidates),
            DiscoveryStrategy::Random => self.pick_random(candidates),
            DiscoveryStrategy::WeightedHealth => self.pick_weighted_health(candidates),
        }
    }

    fn pick_least_loaded(&self, candidates: Vec<Agent>) -> Option<Agent> {
        candidates.into_iter().min_by(|a, b| {
            a.load
                .cmp(&b.load)
                .then_with(|| b.health_score.partial_cmp(&a.health_score).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.registered_at.cmp(&b.registered_at))
        })
    }

    fn pick_round_robin(&self, capability: &str, candidates: Vec<Agent>) -> Option<Agent> {
        let counter = self
            .round_robin_counters
            .entry(capability.to_string())
            .or_insert_with(|| AtomicU64::new(0));
        let idx = (counter.fetch_add(1, Ordering::Relaxed) as usize) % candidates.len();
        candidates.into_iter().nth(idx)
    }

    fn pick_random(&self, candidates: Vec<Agent>) -> Option<Agent> {
        let idx = self.rng.gen_range_u64(0, candidates.len() as u64) as usize;
        candidates.into_iter().nth(idx)
    }

    /// Picks with probability proportional to `health_score^2` (spec
    /// §4.3), so discovery favors healthier agents without starving
    /// merely-adequate ones outright.
    fn pick_weighted_health(&self, candidates: Vec<Agent>) -> Option<Agent> {
        let weights: Vec<f64> = candidates.iter().map(|a| a.health_score.max(0.0).powi(2)).collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return candidates.into_iter().next();
        }

        let roll = self.rng.gen_f64() * total;
        let mut cumulative = 0.0;
        for (agent, weight) in candidates.iter().zip(weights.iter()) {
            cumulative += weight;
            if roll <= cumulative {
                return Some(agent.clone());
            }
        }
        candidates.into_iter().last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use ymera_eventbus::EventBus;
    use ymera_registry::RegistryConfig;
    use ymera_types::clock::SeededRng;
    use ymera_types::{AgentState, Value};

    fn registry_with_agents(agents: &[(&str, u64, f64)]) -> Arc<AgentRegistry> {
        let bus = Arc::new(EventBus::new(16));
        let registry = Arc::new(AgentRegistry::new(RegistryConfig::default(), bus));
        for (id, load, health) in agents {
            let agent_id = AgentId::new(*id);
            registry
                .register(agent_id.clone(), "worker", vec!["summarize".into()], Value::Null, Value::Null)
                .unwrap();
            registry.transition(&agent_id, AgentState::Active, "startup", "system").unwrap();
            for _ in 0..*load {
                registry.increment_load(&agent_id).unwrap();
            }
            // drive health_score toward the requested value via repeated heartbeats
            let metrics = ymera_types::agent::HeartbeatMetrics {
                cpu_usage: 0.0,
                memory_usage: 0.0,
                error_rate: 1.0 - health,
                response_time_ms: 0.0,
            };
            for _ in 0..50 {
                registry.heartbeat(&agent_id, metrics.clone()).unwrap();
            }
        }
        registry
    }

    #[test]
    fn least_loaded_picks_the_lowest_load_agent() {
        let registry = registry_with_agents(&[("a1", 3, 0.9), ("a2", 1, 0.5), ("a3", 5, 0.9)]);
        let discovery = AgentDiscovery::new(registry);
        let picked = discovery.discover("summarize", DiscoveryStrategy::LeastLoaded, 0.0, &[]).unwrap();
        assert_eq!(picked.agent_id, AgentId::new("a2"));
    }

    #[test]
    fn round_robin_cycles_through_candidates() {
        let registry = registry_with_agents(&[("a1", 0, 0.9), ("a2", 0, 0.9)]);
        let discovery = AgentDiscovery::new(registry);

        let first = discovery.discover("summarize", DiscoveryStrategy::RoundRobin, 0.0, &[]).unwrap();
        let second = discovery.discover("summarize", DiscoveryStrategy::RoundRobin, 0.0, &[]).unwrap();
        let third = discovery.discover("summarize", DiscoveryStrategy::RoundRobin, 0.0, &[]).unwrap();
        assert_ne!(first.agent_id, second.agent_id);
        assert_eq!(first.agent_id, third.agent_id);
    }

    #[test]
    fn random_is_reproducible_with_a_seeded_rng() {
        let registry = registry_with_agents(&[("a1", 0, 0.9), ("a2", 0, 0.9), ("a3", 0, 0.9)]);
        let discovery_a = AgentDiscovery::with_rng(registry.clone(), Arc::new(SeededRng::new(42)));
        let discovery_b = AgentDiscovery::with_rng(registry, Arc::new(SeededRng::new(42)));

        let picks_a: Vec<_> = (0..5)
            .map(|_| discovery_a.discover("summarize", DiscoveryStrategy::Random, 0.0, &[]).unwrap().agent_id)
            .collect();
        let picks_b: Vec<_> = (0..5)
            .map(|_| discovery_b.discover("summarize", DiscoveryStrategy::Random, 0.0, &[]).unwrap().agent_id)
            .collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn no_candidates_returns_none() {
        let bus = Arc::new(EventBus::new(16));
        let registry = Arc::new(AgentRegistry::new(RegistryConfig::default(), bus));
        let discovery = AgentDiscovery::new(registry);
        assert!(discovery.discover("nonexistent", DiscoveryStrategy::LeastLoaded, 0.0, &[]).is_none());
    }

    #[test]
    fn excluded_agents_are_never_returned() {
        let registry = registry_with_agents(&[("a1", 0, 0.9), ("a2", 0, 0.9)]);
        let discovery = AgentDiscovery::new(registry);
        let excluded = vec![AgentId::new("a1")];
        for _ in 0..5 {
            let picked = discovery
                .discover("summarize", DiscoveryStrategy::RoundRobin, 0.0, &excluded)
                .unwrap();
            assert_ne!(picked.agent_id, AgentId::new("a1"));
        }
    }
}
