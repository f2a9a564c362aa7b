use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::audit::AuditError;
use crate::errors::AppError;
use crate::models::audit::AuditLogEntry;
use crate::models::user::DbUser;

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();

    // RFC 3339, which covers the fixed-width format the app writes
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite CURRENT_TIMESTAMP: "YYYY-MM-DD HH:MM:SS" (optional fraction)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| "invalid datetime: date out of range".to_string())?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(format!("invalid datetime: {}", s))
}

fn parse_json(column: &str, s: &str) -> Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid json in {}: {}", column, e))
}

pub fn db_user_from_row(row: &SqliteRow) -> Result<DbUser, AppError> {
    let id_s: String = row.try_get("id").map_err(|e| AppError::internal(format!("missing id: {}", e)))?;
    let name: String = row.try_get("name").map_err(|e| AppError::internal(format!("missing name: {}", e)))?;
    let email: String = row.try_get("email").map_err(|e| AppError::internal(format!("missing email: {}", e)))?;
    let password_hash: String = row.try_get("password_hash").map_err(|e| AppError::internal(format!("missing password_hash: {}", e)))?;
    let role_s: String = row.try_get("role").map_err(|e| AppError::internal(format!("missing role: {}", e)))?;
    let status_s: String = row.try_get("status").map_err(|e| AppError::internal(format!("missing status: {}", e)))?;
    let created_at_s: String = row.try_get("created_at").map_err(|e| AppError::internal(format!("missing created_at: {}", e)))?;
    let updated_at_s: String = row.try_get("updated_at").map_err(|e| AppError::internal(format!("missing updated_at: {}", e)))?;

    let id = Uuid::parse_str(&id_s).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))?;
    let role = role_s.parse().map_err(|e| AppError::internal(format!("{}", e)))?;
    let status = status_s.parse()?;
    let created_at = parse_datetime(&created_at_s).map_err(AppError::internal)?;
    let updated_at = parse_datetime(&updated_at_s).map_err(AppError::internal)?;

    Ok(DbUser { id, name, email, password_hash, role, status, created_at, updated_at })
}

pub fn audit_entry_from_row(row: &SqliteRow) -> Result<AuditLogEntry, AuditError> {
    let id_s: String = row.try_get("id")?;
    let actor_id_s: String = row.try_get("actor_id")?;
    let action_s: String = row.try_get("action")?;
    let resource_s: String = row.try_get("resource")?;
    let resource_id: Option<String> = row.try_get("resource_id")?;
    let before_s: Option<String> = row.try_get("before_state")?;
    let after_s: Option<String> = row.try_get("after_state")?;
    let description: String = row.try_get("description")?;
    let details_s: String = row.try_get("details")?;
    let ip_address: Option<String> = row.try_get("ip_address")?;
    let user_agent: Option<String> = row.try_get("user_agent")?;
    let status_s: String = row.try_get("status")?;
    let error_message: Option<String> = row.try_get("error_message")?;
    let duration_ms: Option<i64> = row.try_get("duration_ms")?;
    let created_at_s: String = row.try_get("created_at")?;

    let id = Uuid::parse_str(&id_s).map_err(|e| AuditError::Corrupt(format!("invalid uuid: {}", e)))?;
    let actor_id = Uuid::parse_str(&actor_id_s).map_err(|e| AuditError::Corrupt(format!("invalid actor uuid: {}", e)))?;
    let before_state = before_s.map(|s| parse_json("before_state", &s)).transpose().map_err(AuditError::Corrupt)?;
    let after_state = after_s.map(|s| parse_json("after_state", &s)).transpose().map_err(AuditError::Corrupt)?;
    let details = parse_json("details", &details_s).map_err(AuditError::Corrupt)?;
    let created_at = parse_datetime(&created_at_s).map_err(AuditError::Corrupt)?;

    Ok(AuditLogEntry {
        id,
        actor_id,
        action: action_s.parse()?,
        resource: resource_s.parse()?,
        resource_id,
        before_state,
        after_state,
        description,
        details,
        ip_address,
        user_agent,
        status: status_s.parse()?,
        error_message,
        duration_ms,
        created_at,
    })
}
