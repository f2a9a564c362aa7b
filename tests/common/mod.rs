#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`
use uuid::Uuid;

use platform_guard::audit::AuditRecorder;
use platform_guard::authz::Role;
use platform_guard::create_app;
use platform_guard::db::users::{self, NewUser};
use platform_guard::jwt::JwtConfig;
use platform_guard::models::audit::{AuditFilter, AuditLogEntry, PageRequest};
use platform_guard::utils::hash_password;

pub const JWT_SECRET: &str = "test-secret";
pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub jwt: JwtConfig,
    _dir: TempDir,
}

pub async fn setup() -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", JWT_SECRET);
    let app = create_app(pool.clone()).await?;

    Ok(TestApp {
        app,
        pool,
        jwt: JwtConfig {
            secret: Arc::new(JWT_SECRET.as_bytes().to_vec()),
            exp_hours: 1,
        },
        _dir: dir,
    })
}

impl TestApp {
    /// Inserts an account with [`PASSWORD`] and returns its id.
    pub async fn seed_user(&self, role: Role) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let email = format!("{}-{}@example.com", role, id.simple());
        let password_hash = hash_password(PASSWORD)?;

        users::insert_user(
            &self.pool,
            NewUser {
                id,
                name: "Seeded User",
                email: &email,
                password_hash: &password_hash,
                role,
            },
        )
        .await?;

        Ok(id)
    }

    pub async fn seed_with_token(&self, role: Role) -> Result<(Uuid, String)> {
        let id = self.seed_user(role).await?;
        Ok((id, self.token(id, role)?))
    }

    pub fn token(&self, user_id: Uuid, role: Role) -> Result<String> {
        Ok(self.jwt.encode(user_id, role)?)
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Ok((status, json))
    }

    pub async fn audit_entries(&self) -> Result<Vec<AuditLogEntry>> {
        let page = AuditRecorder::sqlite(self.pool.clone())
            .list(&AuditFilter::default(), PageRequest::new(None, Some(100)))
            .await?;
        Ok(page.entries)
    }

    /// Audit writes are fire-and-forget, so poll until `expected` entries exist.
    pub async fn wait_for_audit(&self, expected: usize) -> Result<Vec<AuditLogEntry>> {
        for _ in 0..100 {
            let entries = self.audit_entries().await?;
            if entries.len() >= expected {
                return Ok(entries);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        anyhow::bail!("timed out waiting for {} audit entries", expected)
    }

    /// Gives in-flight audit writes time to land before asserting on absence.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
