use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::audit::AuditError;
use crate::db::row_parsers::audit_entry_from_row;
use crate::models::audit::{
    AuditFilter, AuditLogEntry, AuditPage, AuditStats, DateWindow, NewAuditEntry, PageRequest, Pagination,
};
use crate::utils::format_timestamp;

/// Persistence seam for audit entries. Entries are immutable once inserted.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, AuditError>;

    async fn find(&self, id: Uuid) -> Result<Option<AuditLogEntry>, AuditError>;

    /// Newest first.
    async fn list(&self, filter: &AuditFilter, page: PageRequest) -> Result<AuditPage, AuditError>;

    async fn stats(&self, window: DateWindow) -> Result<AuditStats, AuditError>;
}

const ENTRY_COLUMNS: &str = "id, actor_id, action, resource, resource_id, before_state, after_state, \
     description, details, ip_address, user_agent, status, error_message, duration_ms, created_at";

#[derive(Clone)]
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn grouped_counts(&self, column: &str, window: DateWindow) -> Result<BTreeMap<String, i64>, AuditError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {column}, COUNT(*) FROM audit_logs WHERE 1 = 1"));
        push_window(&mut qb, window);
        qb.push(format!(" GROUP BY {column}"));

        let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().collect())
    }
}

fn push_window(qb: &mut QueryBuilder<'_, Sqlite>, window: DateWindow) {
    if let Some(start) = window.start {
        qb.push(" AND created_at >= ").push_bind(format_timestamp(start));
    }
    if let Some(end) = window.end {
        qb.push(" AND created_at <= ").push_bind(format_timestamp(end));
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AuditFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(action) = filter.action {
        qb.push(" AND action = ").push_bind(action.as_str());
    }
    if let Some(resource) = filter.resource {
        qb.push(" AND resource = ").push_bind(resource.as_str());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(actor_id) = filter.actor_id {
        qb.push(" AND actor_id = ").push_bind(actor_id.to_string());
    }
    push_window(qb, filter.window);
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        qb.push(" AND description LIKE ")
            .push_bind(format!("%{}%", escape_like(search)))
            .push(" ESCAPE '\\'");
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn insert(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, AuditError> {
        let id = Uuid::new_v4();
        // Stored at microsecond precision; truncate so the returned entry matches a re-read.
        let created_at = Utc::now().trunc_subsecs(6);

        sqlx::query(
            "INSERT INTO audit_logs (id, actor_id, action, resource, resource_id, before_state, after_state, \
             description, details, ip_address, user_agent, status, error_message, duration_ms, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(entry.actor_id.to_string())
        .bind(entry.action.as_str())
        .bind(entry.resource.as_str())
        .bind(entry.resource_id.as_deref())
        .bind(entry.before_state.as_ref().map(|v| v.to_string()))
        .bind(entry.after_state.as_ref().map(|v| v.to_string()))
        .bind(&entry.description)
        .bind(entry.details.to_string())
        .bind(entry.ip_address.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(entry.status.as_str())
        .bind(entry.error_message.as_deref())
        .bind(entry.duration_ms)
        .bind(format_timestamp(created_at))
        .execute(&self.pool)
        .await?;

        Ok(AuditLogEntry::from_new(id, entry, created_at))
    }

    async fn find(&self, id: Uuid) -> Result<Option<AuditLogEntry>, AuditError> {
        let row = sqlx::query(&format!("SELECT {ENTRY_COLUMNS} FROM audit_logs WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(audit_entry_from_row).transpose()
    }

    async fn list(&self, filter: &AuditFilter, page: PageRequest) -> Result<AuditPage, AuditError> {
        let mut count: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM audit_logs");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {ENTRY_COLUMNS} FROM audit_logs"));
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows = select.build().fetch_all(&self.pool).await?;
        let entries = rows
            .iter()
            .map(audit_entry_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AuditPage {
            entries,
            pagination: Pagination::new(page, total),
        })
    }

    async fn stats(&self, window: DateWindow) -> Result<AuditStats, AuditError> {
        let mut total: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM audit_logs WHERE 1 = 1");
        push_window(&mut total, window);
        let total: i64 = total.build_query_scalar().fetch_one(&self.pool).await?;

        let mut unique: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(DISTINCT actor_id) FROM audit_logs WHERE 1 = 1");
        push_window(&mut unique, window);
        let unique_users: i64 = unique.build_query_scalar().fetch_one(&self.pool).await?;

        Ok(AuditStats {
            total,
            by_action: self.grouped_counts("action", window).await?,
            by_resource: self.grouped_counts("resource", window).await?,
            by_status: self.grouped_counts("status", window).await?,
            unique_users,
        })
    }
}
