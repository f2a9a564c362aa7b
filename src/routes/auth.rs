use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::audit::{PendingAudit, RequestContext};
use crate::db::users;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::audit::{AuditAction, AuditResource, NewAuditEntry};
use crate::models::user::{AuthResponse, LoginRequest, User, UserStatus};
use crate::routes::audit_if_privileged;
use crate::utils::verify_password;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account suspended")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    context: RequestContext,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Response> {
    let db_user = users::find_by_email(&state.pool, &payload.email)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let actor = AuthUser {
        user_id: db_user.id,
        role: db_user.role,
    };
    let entry = |description: &str| {
        NewAuditEntry::new(actor.user_id, AuditAction::Login, AuditResource::User, description)
            .resource_id(actor.user_id)
            .details(json!({ "role": actor.role }))
            .context(&context)
    };

    if !verify_password(&payload.password, &db_user.password_hash)? {
        // The failed attempt is recorded with the error response.
        let audit = audit_if_privileged(&actor, entry("Failed login").failed("invalid credentials"));
        return Ok((audit, AppError::unauthorized("invalid credentials")).into_response());
    }

    if db_user.status == UserStatus::Suspended {
        return Err(AppError::forbidden("account suspended"));
    }

    let token = state.jwt.encode(db_user.id, db_user.role)?;
    let user = User::from(db_user);
    let audit = audit_if_privileged(&actor, entry("Login"));

    Ok((audit, Json(AuthResponse { token, user })).into_response())
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let db_user = users::fetch_user(&state.pool, auth.user_id).await?;
    Ok(Json(User::from(db_user)))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged", body = MessageResponse))
)]
pub async fn logout(auth: AuthUser, context: RequestContext) -> (Option<PendingAudit>, Json<MessageResponse>) {
    let audit = audit_if_privileged(
        &auth,
        NewAuditEntry::new(auth.user_id, AuditAction::Logout, AuditResource::User, "Logout")
            .resource_id(auth.user_id)
            .context(&context),
    );

    (
        audit,
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    )
}
