use axum::Json;

use crate::authz::{get_role_permissions, Role};
use crate::jwt::AuthUser;
use crate::models::permission::PermissionsResponse;

#[utoipa::path(
    get,
    path = "/api/permissions/me",
    tag = "Permissions",
    responses((status = 200, description = "Effective permissions of the caller", body = PermissionsResponse))
)]
pub async fn my_permissions(auth: AuthUser) -> Json<PermissionsResponse> {
    let permissions = get_role_permissions(auth.role)
        .iter()
        .map(|p| p.to_string())
        .collect();

    Json(PermissionsResponse {
        role: auth.role,
        is_super_admin: auth.role == Role::SuperAdmin,
        permissions,
    })
}
