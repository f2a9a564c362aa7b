use tokio::sync::mpsc::{self, error::TrySendError};

use crate::audit::AuditRecorder;
use crate::models::audit::NewAuditEntry;

/// Fire-and-forget handle for audit entries. `submit` never waits; when the
/// queue is full the entry is dropped with a warning.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<NewAuditEntry>,
}

impl AuditSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<NewAuditEntry>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn submit(&self, entry: NewAuditEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(TrySendError::Full(entry)) => {
                tracing::warn!(action = %entry.action, resource = %entry.resource, "audit queue full, entry dropped");
                false
            }
            Err(TrySendError::Closed(entry)) => {
                tracing::warn!(action = %entry.action, resource = %entry.resource, "audit writer stopped, entry dropped");
                false
            }
        }
    }
}

/// Drains the sink until every sender is dropped. Each entry is written on its
/// own task so a slow insert does not hold up the queue.
pub async fn start_audit_writer(mut rx: mpsc::Receiver<NewAuditEntry>, recorder: AuditRecorder) {
    tracing::info!("Audit writer started");

    while let Some(entry) = rx.recv().await {
        let recorder = recorder.clone();
        tokio::spawn(async move {
            recorder.record(entry).await;
        });
    }

    tracing::info!("Audit writer stopped");
}
