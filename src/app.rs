use std::sync::Arc;

use axum::http::Method;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::audit::{self, AuditConfig, AuditRecorder, AuditSink};
use crate::authz::catalog;
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::routes::{audit_logs, auth, health, permissions, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    /// Read side of the audit trail.
    pub audit: AuditRecorder,
    /// Write side; entries submitted here are persisted in the background.
    pub audit_sink: AuditSink,
    pub audit_config: Arc<AuditConfig>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, audit_config: AuditConfig) -> Self {
        let audit = AuditRecorder::sqlite(pool.clone());
        let (audit_sink, rx) = AuditSink::channel(audit_config.queue_capacity);
        tokio::spawn(audit::start_audit_writer(rx, audit.clone()));

        Self {
            pool,
            jwt: Arc::new(jwt),
            audit,
            audit_sink,
            audit_config: Arc::new(audit_config),
        }
    }
}

/// Builds the router. Fails when the permission map does not pass its
/// integrity checks or the environment is incomplete.
pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let role_map = catalog::init()?;
    tracing::info!(permissions = role_map.catalog().len(), "permission catalog loaded");

    let jwt_config = JwtConfig::from_env()?;
    let audit_config = AuditConfig::from_env()?;
    let state = AppState::new(pool, jwt_config, audit_config);

    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let user_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route("/:id", get(users::get_user).delete(users::delete_user))
        .route("/:id/profile", put(users::update_profile))
        .route("/:id/role", put(users::update_role))
        .route("/:id/status", put(users::update_status));

    let audit_routes = Router::new()
        .route("/", get(audit_logs::list_audit_logs))
        .route("/stats", get(audit_logs::audit_stats))
        .route("/user/:user_id", get(audit_logs::user_audit_logs))
        .route("/:id", get(audit_logs::get_audit_log));

    let api = Router::new()
        .route("/health", get(health::health))
        .route("/permissions/me", get(permissions::my_permissions))
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/audit-logs", audit_routes)
        // Runs after routing so matched path params reach the audit layer.
        .route_layer(from_fn(audit::capture_route_params));

    Router::new()
        .nest("/api", api)
        .fallback(|| async { AppError::not_found("no such route") })
        .layer(from_fn_with_state(state.clone(), audit::audit_trail))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
