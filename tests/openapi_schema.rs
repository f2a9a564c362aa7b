use serde_json::Value;

#[test]
fn openapi_exposes_audit_entry_fields() -> anyhow::Result<()> {
    let doc = platform_guard::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    let props = v
        .get("components")
        .and_then(Value::as_object)
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_object)
        .and_then(|s| s.get("AuditLogEntry"))
        .and_then(Value::as_object)
        .and_then(|t| t.get("properties"))
        .and_then(Value::as_object)
        .expect("components.schemas.AuditLogEntry.properties must exist");

    let keys = [
        "actor_id",
        "action",
        "resource",
        "resource_id",
        "before_state",
        "after_state",
        "status",
        "duration_ms",
        "created_at",
    ];
    for k in &keys {
        assert!(props.contains_key(*k), "OpenAPI AuditLogEntry schema missing '{}'", k);
    }

    Ok(())
}

#[test]
fn openapi_lists_guarded_routes_with_bearer_auth() -> anyhow::Result<()> {
    let doc = platform_guard::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    let paths = v.get("paths").and_then(Value::as_object).expect("paths must exist");
    for p in [
        "/api/users/{id}/role",
        "/api/users/{id}/status",
        "/api/permissions/me",
        "/api/audit-logs/stats",
        "/api/audit-logs/user/{user_id}",
    ] {
        assert!(paths.contains_key(p), "OpenAPI document missing path '{}'", p);
    }

    assert!(v.pointer("/components/securitySchemes/bearerAuth").is_some());
    assert_eq!(v.pointer("/servers/0/url").and_then(Value::as_str), Some("http://localhost:8000"));

    Ok(())
}
