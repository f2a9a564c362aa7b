//! Audit trail: append-only recording of privileged actions.
//!
//! - [`AuditRecorder`] persists entries through an [`AuditStore`] and never
//!   propagates a failure to its caller.
//! - [`AuditSink`] is the fire-and-forget entry point; a background writer
//!   drains it into the recorder.
//! - [`middleware::audit_trail`] observes requests and submits one entry per
//!   audited request: the handler's [`PendingAudit`] when it attached one,
//!   otherwise a generic entry for privileged actors.

mod context;
pub mod middleware;
mod recorder;
mod sink;
pub mod store;

pub use context::RequestContext;
pub use middleware::{audit_trail, capture_route_params, PendingAudit, RouteParams};
pub use recorder::AuditRecorder;
pub use sink::{start_audit_writer, AuditSink};
pub use store::{AuditStore, SqliteAuditStore};

use crate::errors::AppError;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("unknown audit action: {0}")]
    UnknownAction(String),
    #[error("unknown audit resource: {0}")]
    UnknownResource(String),
    #[error("unknown audit status: {0}")]
    UnknownStatus(String),
    #[error("invalid audit entry: {0}")]
    InvalidEntry(String),
    #[error("corrupt audit row: {0}")]
    Corrupt(String),
    #[error("audit store error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub enabled: bool,
    pub queue_capacity: usize,
    /// Largest JSON request body buffered to look for an `id` field.
    pub body_limit: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 1024,
            body_limit: 64 * 1024,
        }
    }
}

impl AuditConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let enabled = match std::env::var("AUDIT_ENABLED") {
            Ok(value) => !matches!(value.trim().to_lowercase().as_str(), "0" | "false" | "off" | "no"),
            Err(_) => defaults.enabled,
        };
        let queue_capacity = env_usize("AUDIT_QUEUE_CAPACITY", defaults.queue_capacity)?.max(1);
        let body_limit = env_usize("AUDIT_BODY_LIMIT", defaults.body_limit)?;

        Ok(Self {
            enabled,
            queue_capacity,
            body_limit,
        })
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize, AppError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<usize>()
            .map_err(|_| AppError::configuration(format!("{name} must be a valid integer"))),
        Err(_) => Ok(default),
    }
}
