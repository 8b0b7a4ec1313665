//! Postgres-backed `audit_log` appender (spec §6 schema sketch:
//! `audit_log(event_type, actor, target, details_json, ts)`).

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, info};

use crate::record::AuditRecord;
use crate::{DurableLog, DurableLogError};

#[derive(Clone)]
pub struct PostgresDurableLog {
    pool: PgPool,
}

impl PostgresDurableLog {
    pub async fn connect(database_url: &str) -> Result<Self, DurableLogError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| DurableLogError::Unavailable(e.to_string()))?;
        info!("durable log connected");
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DurableLog for PostgresDurableLog {
    async fn append(&self, record: AuditRecord) -> Result<(), DurableLogError> {
        let details_json = record.details.to_json();
        sqlx::query(
            "INSERT INTO audit_log (event_type, actor, target, details_json, ts) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&record.event_type)
        .bind(&record.actor)
        .bind(&record.target)
        .bind(details_json)
        .bind(record.ts)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "audit_log insert failed");
            DurableLogError::Unavailable(e.to_string())
        })?;
        Ok(())
    }
}
