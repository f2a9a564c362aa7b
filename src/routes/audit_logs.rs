use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{permissions, require_permission};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::audit::{
    AuditAction, AuditFilter, AuditListQuery, AuditLogView, AuditPageResponse, AuditResource, AuditStats, AuditStatsQuery,
    AuditStatus, DateWindow, PageQuery, PageRequest,
};
use crate::utils::parse_date_bound;

fn date_window(start: Option<&str>, end: Option<&str>) -> AppResult<DateWindow> {
    let bound = |raw: Option<&str>, end_of_day: bool| {
        raw.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_date_bound(s, end_of_day))
            .transpose()
    };

    let window = DateWindow {
        start: bound(start, false)?,
        end: bound(end, true)?,
    };

    if let (Some(start), Some(end)) = (window.start, window.end) {
        if start > end {
            return Err(AppError::bad_request("start_date must not be after end_date"));
        }
    }

    Ok(window)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl AuditListQuery {
    fn into_filter(self) -> AppResult<(AuditFilter, PageRequest)> {
        let window = date_window(self.start_date.as_deref(), self.end_date.as_deref())?;

        let filter = AuditFilter {
            action: non_empty(self.action).map(|s| s.parse::<AuditAction>()).transpose()?,
            resource: non_empty(self.resource).map(|s| s.parse::<AuditResource>()).transpose()?,
            status: non_empty(self.status).map(|s| s.parse::<AuditStatus>()).transpose()?,
            actor_id: self.user_id,
            window,
            search: non_empty(self.search),
        };

        Ok((filter, PageRequest::new(self.page, self.limit)))
    }
}

#[utoipa::path(
    get,
    path = "/api/audit-logs",
    tag = "Audit",
    params(AuditListQuery),
    responses(
        (status = 200, description = "Filtered audit entries, newest first", body = AuditPageResponse),
        (status = 400, description = "Unknown action, resource or status"),
        (status = 403, description = "Missing audit:view")
    )
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<AuditListQuery>,
) -> AppResult<Json<AuditPageResponse>> {
    require_permission(&auth, permissions::AUDIT_VIEW)?;

    let (filter, page) = query.into_filter()?;
    let page = state.audit.list(&filter, page).await?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    get,
    path = "/api/audit-logs/stats",
    tag = "Audit",
    params(AuditStatsQuery),
    responses(
        (status = 200, description = "Aggregate over the window", body = AuditStats),
        (status = 403, description = "Missing audit:view")
    )
)]
pub async fn audit_stats(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<AuditStatsQuery>,
) -> AppResult<Json<AuditStats>> {
    require_permission(&auth, permissions::AUDIT_VIEW)?;

    let window = date_window(query.start_date.as_deref(), query.end_date.as_deref())?;
    Ok(Json(state.audit.stats(window).await?))
}

#[utoipa::path(
    get,
    path = "/api/audit-logs/{id}",
    tag = "Audit",
    params(("id" = Uuid, Path, description = "Audit entry id")),
    responses(
        (status = 200, description = "Audit entry with computed changes", body = AuditLogView),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_audit_log(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AuditLogView>> {
    require_permission(&auth, permissions::AUDIT_VIEW)?;

    let entry = state
        .audit
        .find(id)
        .await?
        .ok_or_else(|| AppError::not_found("audit entry not found"))?;
    Ok(Json(entry.into()))
}

#[utoipa::path(
    get,
    path = "/api/audit-logs/user/{user_id}",
    tag = "Audit",
    params(("user_id" = Uuid, Path, description = "Actor id"), PageQuery),
    responses(
        (status = 200, description = "Entries recorded for one actor", body = AuditPageResponse),
        (status = 403, description = "Missing audit:view")
    )
)]
pub async fn user_audit_logs(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<AuditPageResponse>> {
    require_permission(&auth, permissions::AUDIT_VIEW)?;

    let page = state
        .audit
        .list_for_actor(user_id, PageRequest::new(query.page, query.limit))
        .await?;
    Ok(Json(page.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_parses_closed_enums() {
        let query = AuditListQuery {
            action: Some("ROLE_CHANGE".into()),
            status: Some("ERROR".into()),
            search: Some("  ".into()),
            limit: Some(500),
            ..AuditListQuery::default()
        };
        let (filter, page) = query.into_filter().unwrap();
        assert_eq!(filter.action, Some(AuditAction::RoleChange));
        assert_eq!(filter.status, Some(AuditStatus::Error));
        assert!(filter.search.is_none());
        assert_eq!(page.limit, 100);
    }

    #[test]
    fn unknown_enum_values_are_bad_requests() {
        let query = AuditListQuery {
            resource: Some("SPACESHIP".into()),
            ..AuditListQuery::default()
        };
        assert!(matches!(query.into_filter(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn inverted_windows_are_rejected() {
        assert!(date_window(Some("2026-02-01"), Some("2026-01-01")).is_err());
        let same_day = date_window(Some("2026-02-01"), Some("2026-02-01")).unwrap();
        assert!(same_day.start < same_day.end);
    }
}
