pub mod audit_logs;
pub mod auth;
pub mod health;
pub mod permissions;
pub mod users;

use crate::audit::PendingAudit;
use crate::jwt::AuthUser;
use crate::models::audit::NewAuditEntry;

/// Attaches a handler-built entry to the response when the actor's role is
/// audited. The audit middleware completes and submits it.
pub(crate) fn audit_if_privileged(actor: &AuthUser, entry: NewAuditEntry) -> Option<PendingAudit> {
    actor.role.is_audited().then(|| PendingAudit(entry))
}
