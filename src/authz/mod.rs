//! Authorization: permission catalog, resolver and modification guard.
//!
//! This module implements the static RBAC model with:
//! - A frozen permission catalog and role → permission map
//! - Fail-closed resolution helpers (single, any-of, all-of, verb/resource)
//! - Super admin bypass as a single well-known branch
//! - A two-stage escalation guard for user mutations

pub mod catalog;
pub mod guard;
mod resolver;
mod role;

pub use catalog::{permissions, CatalogError, RolePermissionMap, CATALOG};
pub use guard::{check_user_modification, ensure_can_modify_target, UserModification};
pub use resolver::{
    can_perform_action, get_role_permissions, has_all_permissions, has_any_permission,
    has_permission,
};
pub use role::{Role, UnknownRole};

use crate::jwt::AuthUser;

/// Outcome of a failed access check. Maps to 401 and 403 respectively.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("{0}")]
    Denied(String),
}

impl AccessError {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied(reason.into())
    }
}

pub fn require_permission(auth: &AuthUser, permission: &str) -> Result<(), AccessError> {
    if has_permission(auth.role, permission) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %auth.user_id,
            role = %auth.role,
            permission = %permission,
            "missing permission"
        );
        Err(AccessError::denied(format!("missing permission {permission}")))
    }
}

/// Passes when the caller is `target` or holds `permission`.
pub fn require_self_or(auth: &AuthUser, target: uuid::Uuid, permission: &str) -> Result<(), AccessError> {
    if auth.user_id == target {
        return Ok(());
    }
    require_permission(auth, permission)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn require_permission_reports_denial() {
        let moderator = AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Moderator,
        };
        assert!(require_permission(&moderator, permissions::FORUM_PIN).is_ok());
        assert_eq!(
            require_permission(&moderator, permissions::USERS_DELETE),
            Err(AccessError::Denied("missing permission users:delete".to_string()))
        );
    }

    #[test]
    fn require_self_or_lets_users_read_themselves() {
        let client = AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Client,
        };
        assert!(require_self_or(&client, client.user_id, permissions::USERS_VIEW).is_ok());
        assert!(require_self_or(&client, Uuid::new_v4(), permissions::USERS_VIEW).is_err());
    }
}
