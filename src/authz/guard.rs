//! Escalation policy for user mutations.
//!
//! Two stages:
//! 1. [`check_user_modification`] decides from the request alone (actor,
//!    target id, requested role). It has no database access.
//! 2. [`ensure_can_modify_target`] re-checks once the handler has fetched the
//!    target's *current* role. Every user-mutation handler calls both.

use uuid::Uuid;

use super::role::Role;
use super::AccessError;
use crate::jwt::AuthUser;

/// What a user mutation is attempting.
#[derive(Debug, Clone, Copy)]
pub struct UserModification {
    pub target_user_id: Uuid,
    pub requested_role: Option<Role>,
}

impl UserModification {
    pub fn fields(target_user_id: Uuid) -> Self {
        Self {
            target_user_id,
            requested_role: None,
        }
    }

    pub fn role_change(target_user_id: Uuid, role: Role) -> Self {
        Self {
            target_user_id,
            requested_role: Some(role),
        }
    }
}

pub fn check_user_modification(
    actor: Option<&AuthUser>,
    request: &UserModification,
) -> Result<(), AccessError> {
    let actor = actor.ok_or(AccessError::AuthenticationRequired)?;

    if actor.role == Role::SuperAdmin {
        return Ok(());
    }

    match request.requested_role {
        Some(Role::SuperAdmin) => {
            return Err(deny(actor, request, "only a super_admin can grant super_admin"));
        }
        Some(Role::Admin) => {
            return Err(deny(actor, request, "only a super_admin can grant admin"));
        }
        _ => {}
    }

    // Already covered above; spelled out so the moderator rule is auditable on its own.
    if actor.role == Role::Moderator
        && matches!(request.requested_role, Some(Role::Admin | Role::SuperAdmin))
    {
        return Err(deny(actor, request, "moderators cannot grant admin roles"));
    }

    if request.target_user_id != actor.user_id {
        return match actor.role {
            Role::Admin | Role::Moderator => Ok(()),
            _ => Err(deny(actor, request, "only self-modification is allowed")),
        };
    }

    Ok(())
}

/// Second-stage check against the fetched target's current role.
pub fn ensure_can_modify_target(
    actor: &AuthUser,
    target_user_id: Uuid,
    target_role: Role,
) -> Result<(), AccessError> {
    if actor.role == Role::SuperAdmin || actor.user_id == target_user_id {
        return Ok(());
    }

    let allowed = match actor.role {
        Role::Admin => target_role != Role::SuperAdmin,
        Role::Moderator => !matches!(target_role, Role::Admin | Role::SuperAdmin),
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        tracing::warn!(
            actor_id = %actor.user_id,
            actor_role = %actor.role,
            target_id = %target_user_id,
            target_role = %target_role,
            "modification of a higher-privileged account denied"
        );
        Err(AccessError::denied(format!(
            "{} cannot modify a {} account",
            actor.role, target_role
        )))
    }
}

fn deny(actor: &AuthUser, request: &UserModification, reason: &'static str) -> AccessError {
    tracing::warn!(
        actor_id = %actor.user_id,
        actor_role = %actor.role,
        target_id = %request.target_user_id,
        requested_role = ?request.requested_role,
        reason,
        "user modification denied"
    );
    AccessError::denied(reason)
}
