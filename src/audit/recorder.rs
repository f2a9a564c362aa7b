use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::audit::{AuditError, AuditStore, SqliteAuditStore};
use crate::models::audit::{
    AuditFilter, AuditLogEntry, AuditPage, AuditStats, DateWindow, NewAuditEntry, PageRequest,
};

/// Records audit entries and serves the read side.
///
/// `record` swallows every failure: a broken audit store is logged and never
/// fails the action being audited.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub fn sqlite(pool: SqlitePool) -> Self {
        Self::new(Arc::new(SqliteAuditStore::new(pool)))
    }

    pub async fn record(&self, entry: NewAuditEntry) -> Option<AuditLogEntry> {
        let actor_id = entry.actor_id;
        let action = entry.action;
        let resource = entry.resource;

        let outcome = match entry.validate() {
            Ok(()) => self.store.insert(entry).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(saved) => {
                tracing::debug!(id = %saved.id, %action, %resource, %actor_id, "audit entry recorded");
                Some(saved)
            }
            Err(err) => {
                tracing::error!(error = %err, %action, %resource, %actor_id, "failed to record audit entry");
                None
            }
        }
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<AuditLogEntry>, AuditError> {
        self.store.find(id).await
    }

    pub async fn list(&self, filter: &AuditFilter, page: PageRequest) -> Result<AuditPage, AuditError> {
        self.store.list(filter, page).await
    }

    pub async fn list_for_actor(&self, actor_id: Uuid, page: PageRequest) -> Result<AuditPage, AuditError> {
        let filter = AuditFilter {
            actor_id: Some(actor_id),
            ..AuditFilter::default()
        };
        self.store.list(&filter, page).await
    }

    pub async fn stats(&self, window: DateWindow) -> Result<AuditStats, AuditError> {
        self.store.stats(window).await
    }
}
