//! Layered configuration: defaults, then an optional file, then
//! `YMERA_`-prefixed environment variables, each layer overriding the last
//! (mirroring `config/src/loader.rs`'s file -> environment -> defaults
//! precedence, reordered so later sources win per `config`'s own merge
//! semantics). Scoped to the core's own tunables — breaker thresholds,
//! worker pool sizing, heartbeat timeout — not the outer HTTP/migration
//! surfaces, which own their own config.

mod error;

pub use error::ConfigError;

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;
use ymera_orchestrator::OrchestratorConfig;
use ymera_registry::RegistryConfig;
use ymera_resilience::CircuitBreakerConfig;

const ENV_PREFIX: &str = "YMERA";

/// Root configuration, one section per component that takes tunables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YmeraConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl YmeraConfig {
    /// Loads defaults, layers an optional file over them, then layers
    /// `YMERA_SECTION__FIELD`-style environment variables over both, and
    /// validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults_json = serde_json::to_string(&YmeraConfig::default())
            .map_err(|e| ConfigError::Invalid(format!("failed to serialize defaults: {e}")))?;

        let mut builder = Config::builder().add_source(File::from_str(&defaults_json, FileFormat::Json));

        if let Some(path) = path {
            info!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(File::from(path.to_path_buf()).required(false));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let config: YmeraConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Hand-rolled invariant checks in the spirit of `config/src/config.rs`'s
    /// `validate_config` — fixed thresholds this crate's consumers rely on,
    /// not expressible as a deserialization-time type constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.heartbeat_timeout_seconds == 0 {
            return Err(ConfigError::Invalid("registry.heartbeat_timeout_seconds must be positive".into()));
        }
        if self.registry.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid("registry.max_consecutive_failures must be positive".into()));
        }
        if self.orchestrator.worker_count == 0 {
            return Err(ConfigError::Invalid("orchestrator.worker_count must be positive".into()));
        }
        if self.orchestrator.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid("orchestrator.max_concurrent_tasks must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.orchestrator.discovery_min_health) {
            return Err(ConfigError::Invalid("orchestrator.discovery_min_health must be within [0, 1]".into()));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid("circuit_breaker.failure_threshold must be positive".into()));
        }
        if self.circuit_breaker.success_threshold == 0 {
            return Err(ConfigError::Invalid("circuit_breaker.success_threshold must be positive".into()));
        }
        if self.circuit_breaker.reset_timeout_ms == 0 {
            return Err(ConfigError::Invalid("circuit_breaker.reset_timeout_ms must be positive".into()));
        }
        if self.circuit_breaker.min_throughput > self.circuit_breaker.window_size {
            return Err(ConfigError::Invalid("circuit_breaker.min_throughput cannot exceed window_size".into()));
        }
        Ok(())
    }
}
