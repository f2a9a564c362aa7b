mod common;

use anyhow::Result;
use axum::http::StatusCode;

use platform_guard::authz::{Role, CATALOG};

#[tokio::test]
async fn health_reports_database_and_catalog() -> Result<()> {
    let t = common::setup().await?;

    let (status, body) = t.send("GET", "/api/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_ok"], true);
    assert_eq!(body["permissions"], CATALOG.len());
    assert_eq!(body["audit_enabled"], true);
    assert!(body.get("db_error").is_none());

    Ok(())
}

#[tokio::test]
async fn permissions_me_lists_the_effective_set() -> Result<()> {
    let t = common::setup().await?;
    let (_, student_token) = t.seed_with_token(Role::Student).await?;
    let (_, root_token) = t.seed_with_token(Role::SuperAdmin).await?;

    let (status, body) = t.send("GET", "/api/permissions/me", Some(&student_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "student");
    assert_eq!(body["is_super_admin"], false);
    let granted: Vec<&str> = body["permissions"]
        .as_array()
        .map(|list| list.iter().filter_map(|p| p.as_str()).collect())
        .unwrap_or_default();
    assert!(granted.contains(&"courses:view"));
    assert!(!granted.contains(&"audit:view"));

    let (_, body) = t.send("GET", "/api/permissions/me", Some(&root_token), None).await?;
    assert_eq!(body["is_super_admin"], true);
    assert_eq!(body["permissions"].as_array().map(Vec::len), Some(CATALOG.len()));

    let (status, _) = t.send("GET", "/api/permissions/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn privileged_login_and_logout_are_audited() -> Result<()> {
    let t = common::setup().await?;
    let admin = t.seed_user(Role::Admin).await?;
    let admin_token = t.token(admin, Role::Admin)?;

    let (_, profile) = t.send("GET", "/api/auth/me", Some(&admin_token), None).await?;
    let email = profile["email"].as_str().unwrap_or_default().to_string();

    let (status, body) = t
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(serde_json::json!({ "email": email, "password": common::PASSWORD })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap_or_default().to_string();

    let (status, _) = t.send("POST", "/api/auth/logout", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    let entries = t.wait_for_audit(3).await?;
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert!(actions.contains(&"LOGIN"));
    assert!(actions.contains(&"LOGOUT"));
    assert!(entries.iter().all(|e| e.actor_id == admin));

    Ok(())
}
