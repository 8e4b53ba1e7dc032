//! Audit pipeline. Records are written off the request path; an audit write
//! failure is logged, never surfaced to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use service_core::error::AppError;

use crate::models::AuditRecord;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), AppError>;
}

/// Appends to the `audit_logs` table.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (id, action, entity, entity_id, performed_by_id, performed_by_kind,
                 description, ip, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id)
        .bind(&record.action)
        .bind(&record.entity)
        .bind(record.entity_id)
        .bind(record.performed_by_id)
        .bind(&record.performed_by_kind)
        .bind(&record.description)
        .bind(&record.ip)
        .bind(&record.metadata)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }
}

/// Collects records in memory for assertions in tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: std::sync::Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.action).collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AppError> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
        Ok(())
    }
}

/// Emits audit records without blocking the caller.
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Spawn the write and return immediately. Failures are logged with the
    /// action name so the event is still traceable.
    pub fn emit(&self, record: AuditRecord) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let action = record.action.clone();
            if let Err(e) = sink.record(record).await {
                tracing::error!(action = %action, "Failed to write audit record: {}", e);
            }
        });
    }

    /// Write before returning. Authentication flows use this so the record
    /// exists by the time the caller sees the outcome.
    pub async fn emit_sync(&self, record: AuditRecord) {
        let action = record.action.clone();
        if let Err(e) = self.sink.record(record).await {
            tracing::error!(action = %action, "Failed to write audit record: {}", e);
        }
    }
}
