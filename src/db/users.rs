//! User account queries.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::Role;
use crate::db::row_parsers::db_user_from_row;
use crate::errors::{AppError, AppResult};
use crate::models::user::{DbUser, UserStatus};
use crate::utils::{format_timestamp, utc_now};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, status, created_at, updated_at";

pub struct NewUser<'a> {
    pub id: Uuid,
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
}

pub async fn insert_user(pool: &SqlitePool, user: NewUser<'_>) -> AppResult<DbUser> {
    ensure_email_available(pool, user.email, None).await?;

    let id = user.id;
    let now = format_timestamp(utc_now());

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(user.name)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.role.as_str())
    .bind(UserStatus::Active.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    fetch_user(pool, id).await
}

pub async fn find_user(pool: &SqlitePool, id: Uuid) -> AppResult<Option<DbUser>> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(db_user_from_row).transpose()
}

pub async fn fetch_user(pool: &SqlitePool, id: Uuid) -> AppResult<DbUser> {
    find_user(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
        .bind(email)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(db_user_from_row).transpose()
}

pub async fn list_users(pool: &SqlitePool) -> AppResult<Vec<DbUser>> {
    let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"))
        .fetch_all(pool)
        .await?;

    rows.iter().map(db_user_from_row).collect()
}

pub async fn update_profile(
    pool: &SqlitePool,
    id: Uuid,
    name: Option<&str>,
    email: Option<&str>,
) -> AppResult<DbUser> {
    if let Some(email) = email {
        ensure_email_available(pool, email, Some(id)).await?;
    }

    sqlx::query(
        "UPDATE users SET name = COALESCE(?, name), email = COALESCE(?, email), updated_at = ? WHERE id = ?",
    )
    .bind(name)
    .bind(email)
    .bind(format_timestamp(utc_now()))
    .bind(id.to_string())
    .execute(pool)
    .await?;

    fetch_user(pool, id).await
}

pub async fn update_role(pool: &SqlitePool, id: Uuid, role: Role) -> AppResult<DbUser> {
    sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(format_timestamp(utc_now()))
        .bind(id.to_string())
        .execute(pool)
        .await?;

    fetch_user(pool, id).await
}

pub async fn update_status(pool: &SqlitePool, id: Uuid, status: UserStatus) -> AppResult<DbUser> {
    sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(format_timestamp(utc_now()))
        .bind(id.to_string())
        .execute(pool)
        .await?;

    fetch_user(pool, id).await
}

pub async fn delete_user(pool: &SqlitePool, id: Uuid) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("user not found"));
    }

    Ok(())
}

async fn ensure_email_available(pool: &SqlitePool, email: &str, except: Option<Uuid>) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ? AND id != COALESCE(?, '')")
        .bind(email)
        .bind(except.map(|id| id.to_string()))
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}
