use serde::Serialize;
use utoipa::ToSchema;

use crate::authz::Role;

/// Effective permissions of the calling account.
#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionsResponse {
    pub role: Role,
    pub is_super_admin: bool,
    pub permissions: Vec<String>,
}
