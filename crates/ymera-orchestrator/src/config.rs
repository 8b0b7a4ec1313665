use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureMode {
    /// `submit` waits for a permit instead of erroring.
    Block,
    /// `submit` fails fast with `Saturated` when no permit is free.
    RejectWhenSaturated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub worker_count: usize,
    pub max_concurrent_tasks: usize,
    pub backpressure_mode: BackpressureMode,
    pub discovery_min_health: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_count: 10,
            max_concurrent_tasks: 100,
            backpressure_mode: BackpressureMode::Block,
            discovery_min_health: 0.6,
        }
    }
}
