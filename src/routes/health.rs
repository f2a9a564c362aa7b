use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::catalog;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_error: Option<String>,
    /// Number of permissions in the loaded catalog; 0 when the map failed to build.
    pub permissions: usize,
    pub audit_enabled: bool,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Health check", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_check = sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&state.pool).await;
    let permissions = catalog::role_map().map(|map| map.catalog().len()).unwrap_or(0);

    let (db_ok, db_error) = match db_check {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };

    Json(HealthResponse {
        status: if db_ok && permissions > 0 { "ok" } else { "degraded" },
        db_ok,
        db_error,
        permissions,
        audit_enabled: state.audit_config.enabled,
    })
}
