use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::login,
		routes::auth::me,
		routes::auth::logout,
		routes::users::list_users,
		routes::users::create_user,
		routes::users::get_user,
		routes::users::update_profile,
		routes::users::update_role,
		routes::users::update_status,
		routes::users::delete_user,
		routes::permissions::my_permissions,
		routes::audit_logs::list_audit_logs,
		routes::audit_logs::audit_stats,
		routes::audit_logs::get_audit_log,
		routes::audit_logs::user_audit_logs
	),
	components(
		schemas(
			crate::authz::Role,
			models::user::User,
			models::user::UserStatus,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::CreateUserRequest,
			models::user::UpdateProfileRequest,
			models::user::UpdateRoleRequest,
			models::user::UpdateStatusRequest,
			models::permission::PermissionsResponse,
			models::audit::AuditAction,
			models::audit::AuditResource,
			models::audit::AuditStatus,
			models::audit::AuditLogEntry,
			models::audit::AuditLogView,
			models::audit::FieldChange,
			models::audit::Pagination,
			models::audit::AuditPageResponse,
			models::audit::AuditStats,
			routes::auth::MessageResponse,
			routes::health::HealthResponse
		)
	),
	tags(
		(name = "Health", description = "Liveness and readiness"),
		(name = "Auth", description = "Authentication endpoints"),
		(name = "Users", description = "Account management under the escalation guard"),
		(name = "Permissions", description = "Effective permissions of the caller"),
		(name = "Audit", description = "Append-only audit trail")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	let root = doc
		.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("OpenAPI root must be an object"))?;
	ensure_security_components(root)?;
	ensure_global_security(root);
	ensure_servers(root, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn ensure_security_components(root: &mut Map<String, Value>) -> anyhow::Result<()> {
	let components = root
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("components must be an object"))?;

	let schemes = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("securitySchemes must be an object"))?;

	schemes.insert(
		"bearerAuth".to_string(),
		json!({
			"type": "http",
			"scheme": "bearer",
			"bearerFormat": "JWT"
		}),
	);
	Ok(())
}

fn ensure_global_security(root: &mut Map<String, Value>) {
	root.entry("security")
		.or_insert_with(|| json!([{ "bearerAuth": [] }]));
}

fn ensure_servers(root: &mut Map<String, Value>, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match root.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			root.insert("servers".to_string(), json!([{ "url": server_url }]));
		}
	}
}
