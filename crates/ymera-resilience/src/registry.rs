//! Named circuit breaker registry, so orchestrator/workflow/agent-manager
//! code shares one breaker per agent or collaborator instead of allocating
//! one per call site.

use std::sync::Arc;

use dashmap::DashMap;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};

#[derive(Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, self.default_config.clone())
    }

    pub fn get_or_create_with(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.clone())
    }

    pub fn all_stats(&self) -> Vec<CircuitBreakerStats> {
        self.breakers.iter().map(|entry| entry.value().stats()).collect()
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    pub fn open_breaker_names(&self) -> Vec<String> {
        self.breakers
            .iter()
            .filter(|entry| entry.value().state() == crate::circuit_breaker::CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_the_same_breaker_for_repeated_names() {
        let registry = BreakerRegistry::new(CircuitBreakerConfig::default());
        let a = registry.get_or_create("agent-1");
        let b = registry.get_or_create("agent-1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_names_get_distinct_breakers() {
        let registry = BreakerRegistry::new(CircuitBreakerConfig::default());
        let a = registry.get_or_create("agent-1");
        let b = registry.get_or_create("agent-2");
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
