mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use platform_guard::audit::AuditRecorder;
use platform_guard::authz::Role;
use platform_guard::models::audit::{AuditAction, AuditResource, AuditStatus, DateWindow, NewAuditEntry};
use platform_guard::utils::format_timestamp;

#[tokio::test]
async fn stats_over_an_empty_window_are_zeroed() -> Result<()> {
    let t = common::setup().await?;
    let (_, root_token) = t.seed_with_token(Role::SuperAdmin).await?;

    let (status, body) = t
        .send(
            "GET",
            "/api/audit-logs/stats?start_date=2000-01-01&end_date=2000-01-02",
            Some(&root_token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "total": 0, "by_action": {}, "by_resource": {}, "by_status": {}, "unique_users": 0 })
    );

    Ok(())
}

#[tokio::test]
async fn stats_count_distinct_actors_with_inclusive_bounds() -> Result<()> {
    let t = common::setup().await?;
    let recorder = AuditRecorder::sqlite(t.pool.clone());
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let first = recorder
        .record(NewAuditEntry::new(alice, AuditAction::Create, AuditResource::Product, "Creation of a product"))
        .await
        .expect("recorded");
    recorder
        .record(NewAuditEntry::new(alice, AuditAction::Update, AuditResource::Product, "Update of a product"))
        .await
        .expect("recorded");
    let last = recorder
        .record(
            NewAuditEntry::new(bob, AuditAction::Delete, AuditResource::Order, "Deletion of an order")
                .failed("order is locked"),
        )
        .await
        .expect("recorded");

    let stats = recorder.stats(DateWindow::default()).await?;
    assert_eq!(stats.total, 3);
    assert_eq!(stats.unique_users, 2);
    assert_eq!(stats.by_resource.get("PRODUCT"), Some(&2));
    assert_eq!(stats.by_status.get("ERROR"), Some(&1));
    assert_eq!(stats.by_action.get("CREATE"), Some(&1));

    let exact = recorder
        .stats(DateWindow {
            start: Some(first.created_at),
            end: Some(last.created_at),
        })
        .await?;
    assert_eq!(exact.total, 3);

    let only_first = recorder
        .stats(DateWindow {
            start: Some(first.created_at),
            end: Some(first.created_at),
        })
        .await?;
    assert_eq!(only_first.total, 1);
    assert_eq!(only_first.unique_users, 1);

    Ok(())
}

#[tokio::test]
async fn stored_entries_read_back_unchanged() -> Result<()> {
    let t = common::setup().await?;
    let recorder = AuditRecorder::sqlite(t.pool.clone());

    let saved = recorder
        .record(
            NewAuditEntry::new(Uuid::new_v4(), AuditAction::SettingsChange, AuditResource::Settings, "Settings change")
                .resource_id("site")
                .before(&json!({ "a": 1, "b": 2 }))
                .after(&json!({ "a": 1, "b": 3 }))
                .details(json!({ "source": "test" })),
        )
        .await
        .expect("recorded");

    let read = recorder.find(saved.id).await?.expect("entry exists");
    assert_eq!(read, saved);

    let changes = read.changes().expect("both snapshots");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes["b"].before, Some(json!(2)));
    assert_eq!(changes["b"].after, Some(json!(3)));

    Ok(())
}

#[tokio::test]
async fn entries_are_append_only() -> Result<()> {
    let t = common::setup().await?;
    let recorder = AuditRecorder::sqlite(t.pool.clone());
    let saved = recorder
        .record(NewAuditEntry::new(Uuid::new_v4(), AuditAction::View, AuditResource::System, "Listing of systems"))
        .await
        .expect("recorded");

    let update = sqlx::query("UPDATE audit_logs SET description = 'edited' WHERE id = ?")
        .bind(saved.id.to_string())
        .execute(&t.pool)
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM audit_logs WHERE id = ?")
        .bind(saved.id.to_string())
        .execute(&t.pool)
        .await;
    assert!(delete.is_err());

    assert!(recorder.find(saved.id).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn list_filters_and_paginates() -> Result<()> {
    let t = common::setup().await?;
    let (_, root_token) = t.seed_with_token(Role::SuperAdmin).await?;
    let recorder = AuditRecorder::sqlite(t.pool.clone());
    let actor = Uuid::new_v4();

    for n in 0..5 {
        recorder
            .record(NewAuditEntry::new(actor, AuditAction::Export, AuditResource::Order, format!("Export batch {n}")))
            .await
            .expect("recorded");
    }
    recorder
        .record(NewAuditEntry::new(actor, AuditAction::RoleChange, AuditResource::User, "Role changed from client to student"))
        .await
        .expect("recorded");

    let (status, body) = t
        .send("GET", "/api/audit-logs?action=EXPORT&limit=2&page=2", Some(&root_token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["pagination"]["total"], 5);
    assert_eq!(body["pagination"]["pages"], 3);

    let (_, body) = t
        .send("GET", "/api/audit-logs?search=client%20to&resource=USER", Some(&root_token), None)
        .await?;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["action"], "ROLE_CHANGE");

    let (_, body) = t
        .send("GET", &format!("/api/audit-logs/user/{}?limit=100", actor), Some(&root_token), None)
        .await?;
    assert_eq!(body["pagination"]["total"], 6);

    let tomorrow = format_timestamp(Utc::now() + Duration::days(1));
    let (_, body) = t
        .send(
            "GET",
            &format!("/api/audit-logs?start_date={}", tomorrow.replace(':', "%3A")),
            Some(&root_token),
            None,
        )
        .await?;
    assert_eq!(body["pagination"]["total"], 0);

    Ok(())
}

#[tokio::test]
async fn unknown_filter_values_are_rejected() -> Result<()> {
    let t = common::setup().await?;
    let (_, root_token) = t.seed_with_token(Role::SuperAdmin).await?;

    let (status, body) = t.send("GET", "/api/audit-logs?action=TELEPORT", Some(&root_token), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "bad request: unknown audit action: TELEPORT");

    let (status, _) = t.send("GET", "/api/audit-logs?status=success", Some(&root_token), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn audit_read_api_requires_audit_view() -> Result<()> {
    let t = common::setup().await?;
    let (_, moderator_token) = t.seed_with_token(Role::Moderator).await?;
    let (_, admin_token) = t.seed_with_token(Role::Admin).await?;

    let (status, _) = t.send("GET", "/api/audit-logs", Some(&moderator_token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.send("GET", "/api/audit-logs/stats", Some(&admin_token), None).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn single_entry_view_includes_changes() -> Result<()> {
    let t = common::setup().await?;
    let (_, root_token) = t.seed_with_token(Role::SuperAdmin).await?;
    let recorder = AuditRecorder::sqlite(t.pool.clone());

    let saved = recorder
        .record(
            NewAuditEntry::new(Uuid::new_v4(), AuditAction::Update, AuditResource::Course, "Update of a course")
                .before(&json!({ "title": "Rust 101", "seats": 10 }))
                .after(&json!({ "title": "Rust 101", "seats": 12 })),
        )
        .await
        .expect("recorded");

    let (status, body) = t
        .send("GET", &format!("/api/audit-logs/{}", saved.id), Some(&root_token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], saved.id.to_string());
    assert_eq!(body["status"], AuditStatus::Success.as_str());
    assert_eq!(body["changes"], json!({ "seats": { "before": 10, "after": 12 } }));

    let (status, _) = t
        .send("GET", &format!("/api/audit-logs/{}", Uuid::new_v4()), Some(&root_token), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
