// Audit sinks for privileged identity operations
use chrono::{DateTime, Utc};
use logger_redacted::redact_json;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use uuid::Uuid;

/// One audit record. Everything except `action` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub actor_user_id: Option<Uuid>,
    pub actor_role: Option<String>,
    pub action: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub metadata: Option<JsonValue>,
    pub ip_address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            actor_user_id: None,
            actor_role: None,
            action: action.into(),
            target_type: None,
            target_id: None,
            metadata: None,
            ip_address: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn actor(mut self, user_id: Uuid) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn actor_role(mut self, role: impl Into<String>) -> Self {
        self.actor_role = Some(role.into());
        self
    }

    pub fn target(mut self, target_type: impl Into<String>, target_id: impl ToString) -> Self {
        self.target_type = Some(target_type.into());
        self.target_id = Some(target_id.to_string());
        self
    }

    /// Attach metadata. Sensitive keys are masked on the way in.
    pub fn metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(redact_json(&metadata));
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }
}

/// Write-only audit destination.
///
/// `record` returns nothing and must never panic: a failed audit write is
/// logged by the sink and does not affect the operation being audited.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits audit events as structured tracing records under the `audit` target
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            action = %event.action,
            actor_user_id = ?event.actor_user_id,
            actor_role = ?event.actor_role,
            target_type = ?event.target_type,
            target_id = ?event.target_id,
            "Audit event"
        );
    }
}

/// Persists audit events to `audit_logs` on background tasks.
///
/// Writes in flight are tracked so a short-lived process can `flush` them
/// before closing the pool.
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            pending: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Writes recorded but not yet reaped
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Wait for every write recorded so far to finish
    pub async fn flush(&self) {
        let mut writes = std::mem::take(&mut *self.pending.lock());
        let count = writes.len();

        while let Some(result) = writes.join_next().await {
            if let Err(e) = result {
                error!(target: "audit", error = %e, "Audit write task failed");
            }
        }
        debug!(target: "audit", count, "Audit writes flushed");
    }

    async fn store(pool: PgPool, event: AuditEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO audit_logs (
                id, actor_user_id, actor_role, action, target_type,
                target_id, metadata, ip_address, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(Uuid::new_v4())
        .bind(event.actor_user_id)
        .bind(&event.actor_role)
        .bind(&event.action)
        .bind(&event.target_type)
        .bind(&event.target_id)
        .bind(&event.metadata)
        .bind(&event.ip_address)
        .bind(event.occurred_at)
        .execute(&pool)
        .await?;

        Ok(())
    }
}

impl AuditSink for PgAuditSink {
    fn record(&self, event: AuditEvent) {
        TracingAuditSink.record(event.clone());

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(target: "audit", action = %event.action, "No runtime available, audit event dropped");
            return;
        };

        let pool = self.pool.clone();
        let write = async move {
            let action = event.action.clone();
            if let Err(e) = Self::store(pool, event).await {
                error!(
                    target: "audit",
                    action = %action,
                    error = %e,
                    "Failed to store audit log"
                );
            }
        };

        let mut pending = self.pending.lock();
        // Reap finished writes so the set stays bounded in long-running services
        while pending.try_join_next().is_some() {}
        pending.spawn_on(write, &handle);
    }
}

/// Keeps events in memory; used by tests and local tooling
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.action.clone()).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}
