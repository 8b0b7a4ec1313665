use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryStrategy {
    LeastLoaded,
    RoundRobin,
    Random,
    WeightedHealth,
}
