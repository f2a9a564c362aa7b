//! Account management. Every mutation runs the same sequence: permission
//! check, request-level guard, target fetch, target-level guard, write, then
//! a manual audit entry carrying before/after snapshots.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{PendingAudit, RequestContext};
use crate::authz::{
    check_user_modification, ensure_can_modify_target, permissions, require_permission, require_self_or,
    Role, UserModification,
};
use crate::db::users::{self, NewUser};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::audit::{AuditAction, AuditResource, NewAuditEntry};
use crate::models::user::{
    CreateUserRequest, DbUser, UpdateProfileRequest, UpdateRoleRequest, UpdateStatusRequest, User, UserStatus,
};
use crate::routes::audit_if_privileged;
use crate::utils::hash_password;

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    responses(
        (status = 200, description = "All accounts", body = [User]),
        (status = 403, description = "Missing users:view")
    )
)]
pub async fn list_users(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<User>>> {
    require_permission(&auth, permissions::USERS_VIEW)?;

    let users = users::list_users(&state.pool).await?;
    Ok(Json(users.into_iter().map(User::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 403, description = "Missing users:create or role not grantable"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    context: RequestContext,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Option<PendingAudit>, Json<User>)> {
    require_permission(&auth, permissions::USERS_CREATE)?;

    let id = Uuid::new_v4();
    let role = payload.role.unwrap_or(Role::Client);
    check_user_modification(Some(&auth), &UserModification::role_change(id, role))?;

    let name = payload.name.trim();
    let email = payload.email.trim();
    if name.is_empty() || email.is_empty() {
        return Err(AppError::bad_request("name and email are required"));
    }

    let password_hash = hash_password(&payload.password)?;
    let created = users::insert_user(
        &state.pool,
        NewUser {
            id,
            name,
            email,
            password_hash: &password_hash,
            role,
        },
    )
    .await?;
    let user = User::from(created);

    let audit = audit_if_privileged(
        &auth,
        NewAuditEntry::new(auth.user_id, AuditAction::Create, AuditResource::User, "Creation of a user")
            .resource_id(user.id)
            .after(&user)
            .context(&context),
    );

    Ok((StatusCode::CREATED, audit, Json(user)))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Account", body = User),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    require_self_or(&auth, id, permissions::USERS_VIEW)?;

    let user = users::fetch_user(&state.pool, id).await?;
    Ok(Json(User::from(user)))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}/profile",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 403, description = "Not allowed to modify this account")
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    context: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<(Option<PendingAudit>, Json<User>)> {
    require_self_or(&auth, id, permissions::USERS_EDIT)?;
    let before = load_target(&state, &auth, UserModification::fields(id)).await?;

    let name = payload.name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let email = payload.email.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let after = User::from(users::update_profile(&state.pool, id, name, email).await?);

    let audit = audit_if_privileged(
        &auth,
        NewAuditEntry::new(auth.user_id, AuditAction::Update, AuditResource::User, "Update of a user profile")
            .resource_id(id)
            .before(&before)
            .after(&after)
            .context(&context),
    );

    Ok((audit, Json(after)))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}/role",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = User),
        (status = 403, description = "Escalation denied")
    )
)]
pub async fn update_role(
    State(state): State<AppState>,
    auth: AuthUser,
    context: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> AppResult<(Option<PendingAudit>, Json<User>)> {
    require_permission(&auth, permissions::USERS_MANAGE_ROLES)?;
    let before = load_target(&state, &auth, UserModification::role_change(id, payload.role)).await?;

    let after = User::from(users::update_role(&state.pool, id, payload.role).await?);

    let audit = audit_if_privileged(
        &auth,
        NewAuditEntry::new(
            auth.user_id,
            AuditAction::RoleChange,
            AuditResource::User,
            format!("Role changed from {} to {}", before.role, after.role),
        )
        .resource_id(id)
        .before(&before)
        .after(&after)
        .context(&context),
    );

    Ok((audit, Json(after)))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}/status",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = User),
        (status = 400, description = "Own account"),
        (status = 403, description = "Not allowed to modify this account")
    )
)]
pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthUser,
    context: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<(Option<PendingAudit>, Json<User>)> {
    require_permission(&auth, permissions::USERS_SUSPEND)?;
    if id == auth.user_id {
        return Err(AppError::bad_request("cannot change the status of your own account"));
    }
    let before = load_target(&state, &auth, UserModification::fields(id)).await?;

    let after = User::from(users::update_status(&state.pool, id, payload.status).await?);

    let (action, description) = match payload.status {
        UserStatus::Suspended => (AuditAction::UserSuspended, "Suspension of a user"),
        UserStatus::Active => (AuditAction::UserActivated, "Activation of a user"),
    };
    let audit = audit_if_privileged(
        &auth,
        NewAuditEntry::new(auth.user_id, action, AuditResource::User, description)
            .resource_id(id)
            .before(&before)
            .after(&after)
            .context(&context),
    );

    Ok((audit, Json(after)))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 400, description = "Own account"),
        (status = 403, description = "Not allowed to modify this account")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    context: RequestContext,
    Path(id): Path<Uuid>,
) -> AppResult<(Option<PendingAudit>, StatusCode)> {
    require_permission(&auth, permissions::USERS_DELETE)?;
    if id == auth.user_id {
        return Err(AppError::bad_request("cannot delete your own account"));
    }
    let before = load_target(&state, &auth, UserModification::fields(id)).await?;

    users::delete_user(&state.pool, id).await?;

    let audit = audit_if_privileged(
        &auth,
        NewAuditEntry::new(auth.user_id, AuditAction::Delete, AuditResource::User, "Deletion of a user")
            .resource_id(id)
            .before(&before)
            .context(&context),
    );

    Ok((audit, StatusCode::NO_CONTENT))
}

/// Runs both guard stages and returns the target's current state.
async fn load_target(state: &AppState, auth: &AuthUser, modification: UserModification) -> AppResult<User> {
    check_user_modification(Some(auth), &modification)?;

    let target: DbUser = users::fetch_user(&state.pool, modification.target_user_id).await?;
    ensure_can_modify_target(auth, target.id, target.role)?;

    Ok(User::from(target))
}
