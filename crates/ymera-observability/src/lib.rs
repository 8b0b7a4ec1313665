//! Structured logging initialization (mirrors `observability/src/logging.rs`'s
//! `StructuredLogger`, trimmed to the one thing every binary in this
//! workspace actually needs: a process-wide subscriber). Call sites log
//! directly through `tracing::{info,warn,error}!` with structured fields —
//! there's no per-call wrapper here, unlike the teacher's `log_info`/
//! `log_warn` helpers, since every collaborator crate already does that
//! itself at its own call sites.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive string, e.g. `"info"` or
    /// `"ymera_orchestrator=debug,info"`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Installs the process-wide `tracing` subscriber. Idempotent-safe to call
/// once at process start; a second call returns `AlreadyInitialized` rather
/// than panicking, since `tracing`'s global dispatcher can only be set once.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ObservabilityError> {
    let filter = EnvFilter::try_from_env("YMERA_LOG").unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => registry.with(fmt::layer().json().with_current_span(false).with_span_list(false)).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };

    result.map_err(|_| ObservabilityError::AlreadyInitialized)?;
    tracing::info!(level = %config.level, format = ?config.format, "tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_json_at_info() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn a_second_init_reports_already_initialized_rather_than_panicking() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        let second = init_tracing(&config);
        assert!(matches!(second, Err(ObservabilityError::AlreadyInitialized)));
    }
}
