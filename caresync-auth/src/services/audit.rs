//! Audit trail service.
//!
//! Security-relevant transitions are recorded through an [`AuditSink`]. The
//! trail is append-only; failures to write an event are logged but never
//! surface to the caller, so an audit outage cannot block authentication.

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::{Collection, Database};

use crate::models::{AuditEvent, Severity};

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), anyhow::Error>;
}

/// MongoDB-backed sink writing into the `audit_events` collection.
#[derive(Clone)]
pub struct MongoAuditSink {
    db: Database,
}

impl MongoAuditSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn events(&self) -> Collection<AuditEvent> {
        self.db.collection("audit_events")
    }
}

#[async_trait]
impl AuditSink for MongoAuditSink {
    async fn append(&self, event: &AuditEvent) -> Result<(), anyhow::Error> {
        self.events().insert_one(event, None).await?;
        Ok(())
    }
}

/// In-memory sink for tests; events are retained for assertions.
#[derive(Default)]
pub struct MemoryAuditSink {
    pub events: std::sync::Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: &AuditEvent) -> Result<(), anyhow::Error> {
        self.events
            .lock()
            .map_err(|e| anyhow::anyhow!("Audit mutex poisoned: {}", e))?
            .push(event.clone());
        Ok(())
    }
}

#[derive(Clone)]
pub struct AuditService {
    sink: Arc<dyn AuditSink>,
}

impl AuditService {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record an event without blocking the caller.
    pub fn record_async(&self, event: AuditEvent) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            Self::write(sink.as_ref(), &event).await;
        });
    }

    /// Record an event and wait for the write. High-severity events on the
    /// hot path use this so a lockout or reuse detection is never lost to a
    /// racing shutdown.
    pub async fn record(&self, event: AuditEvent) {
        Self::write(self.sink.as_ref(), &event).await;
    }

    async fn write(sink: &dyn AuditSink, event: &AuditEvent) {
        if let Err(e) = sink.append(event).await {
            tracing::error!(
                error = %e,
                action = event.action.as_str(),
                "Failed to write audit event"
            );
        } else if event.severity == Severity::High {
            tracing::warn!(
                action = event.action.as_str(),
                detail = %event.detail,
                "Security event recorded"
            );
        } else {
            tracing::debug!(action = event.action.as_str(), "Audit event recorded");
        }
    }
}
