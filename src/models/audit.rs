use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::audit::{AuditError, RequestContext};

/// Closed string enumerations stored as their SCREAMING_SNAKE_CASE names.
macro_rules! closed_enum {
    ($(#[$meta:meta])* $name:ident, $err:ident, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = AuditError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(AuditError::$err(other.to_string())),
                }
            }
        }
    };
}

closed_enum!(
    /// What was done.
    AuditAction, UnknownAction, {
        Create => "CREATE",
        Update => "UPDATE",
        Delete => "DELETE",
        View => "VIEW",
        Login => "LOGIN",
        Logout => "LOGOUT",
        Export => "EXPORT",
        Import => "IMPORT",
        BulkAction => "BULK_ACTION",
        SettingsChange => "SETTINGS_CHANGE",
        PermissionChange => "PERMISSION_CHANGE",
        RoleChange => "ROLE_CHANGE",
        PaymentProcessed => "PAYMENT_PROCESSED",
        BackupCreated => "BACKUP_CREATED",
        BackupRestored => "BACKUP_RESTORED",
        SystemConfig => "SYSTEM_CONFIG",
        UserSuspended => "USER_SUSPENDED",
        UserActivated => "USER_ACTIVATED",
        PasswordReset => "PASSWORD_RESET",
    }
);

closed_enum!(
    /// What it was done to.
    AuditResource, UnknownResource, {
        User => "USER",
        Order => "ORDER",
        Product => "PRODUCT",
        Course => "COURSE",
        Content => "CONTENT",
        Settings => "SETTINGS",
        Payment => "PAYMENT",
        Message => "MESSAGE",
        QuoteRequest => "QUOTE_REQUEST",
        JobApplication => "JOB_APPLICATION",
        ChatbotQuestion => "CHATBOT_QUESTION",
        Ticket => "TICKET",
        ForumPost => "FORUM_POST",
        ForumComment => "FORUM_COMMENT",
        Permission => "PERMISSION",
        Role => "ROLE",
        Backup => "BACKUP",
        System => "SYSTEM",
    }
);

closed_enum!(
    AuditStatus, UnknownStatus, {
        Success => "SUCCESS",
        Error => "ERROR",
        Warning => "WARNING",
    }
);

impl AuditResource {
    /// Human wording used in generated descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            AuditResource::User => "user",
            AuditResource::Order => "order",
            AuditResource::Product => "product",
            AuditResource::Course => "course",
            AuditResource::Content => "content",
            AuditResource::Settings => "settings",
            AuditResource::Payment => "payment",
            AuditResource::Message => "message",
            AuditResource::QuoteRequest => "quote request",
            AuditResource::JobApplication => "job application",
            AuditResource::ChatbotQuestion => "chatbot question",
            AuditResource::Ticket => "ticket",
            AuditResource::ForumPost => "forum post",
            AuditResource::ForumComment => "forum comment",
            AuditResource::Permission => "permission",
            AuditResource::Role => "role",
            AuditResource::Backup => "backup",
            AuditResource::System => "system",
        }
    }
}

// =============================================================================
// ENTRIES
// =============================================================================

/// An audit entry that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub actor_id: Uuid,
    pub action: AuditAction,
    pub resource: AuditResource,
    pub resource_id: Option<String>,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub description: String,
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

impl NewAuditEntry {
    pub fn new(
        actor_id: Uuid,
        action: AuditAction,
        resource: AuditResource,
        description: impl Into<String>,
    ) -> Self {
        Self {
            actor_id,
            action,
            resource,
            resource_id: None,
            before_state: None,
            after_state: None,
            description: description.into(),
            details: Value::Object(Map::new()),
            ip_address: None,
            user_agent: None,
            status: AuditStatus::Success,
            error_message: None,
            duration_ms: None,
        }
    }

    pub fn resource_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn before<T: Serialize>(mut self, state: &T) -> Self {
        self.before_state = serde_json::to_value(state).ok();
        self
    }

    pub fn after<T: Serialize>(mut self, state: &T) -> Self {
        self.after_state = serde_json::to_value(state).ok();
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn context(mut self, context: &RequestContext) -> Self {
        self.ip_address = context.ip.clone();
        self.user_agent = context.user_agent.clone();
        self
    }

    pub fn status(mut self, status: AuditStatus) -> Self {
        self.status = status;
        if status != AuditStatus::Error {
            self.error_message = None;
        }
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = AuditStatus::Error;
        self.error_message = Some(message.into());
        self
    }

    pub fn duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = Some(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
        self
    }

    /// Invariants the store relies on.
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.description.trim().is_empty() {
            return Err(AuditError::InvalidEntry("description is required".into()));
        }
        if self.actor_id.is_nil() {
            return Err(AuditError::InvalidEntry("actor is required".into()));
        }
        if self.error_message.is_some() && self.status != AuditStatus::Error {
            return Err(AuditError::InvalidEntry(
                "error_message is only allowed on ERROR entries".into(),
            ));
        }
        if !self.details.is_object() {
            return Err(AuditError::InvalidEntry("details must be an object".into()));
        }
        Ok(())
    }
}

/// A persisted, immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: AuditAction,
    pub resource: AuditResource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub before_state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub after_state: Option<Value>,
    pub description: String,
    #[schema(value_type = Object)]
    pub details: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn from_new(id: Uuid, entry: NewAuditEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            actor_id: entry.actor_id,
            action: entry.action,
            resource: entry.resource,
            resource_id: entry.resource_id,
            before_state: entry.before_state,
            after_state: entry.after_state,
            description: entry.description,
            details: entry.details,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            status: entry.status,
            error_message: entry.error_message,
            duration_ms: entry.duration_ms,
            created_at,
        }
    }

    /// Read-time diff of the snapshots; `None` unless both are present.
    pub fn changes(&self) -> Option<BTreeMap<String, FieldChange>> {
        match (&self.before_state, &self.after_state) {
            (Some(before), Some(after)) => Some(diff_top_level(before, after)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FieldChange {
    /// Absent when the key was added.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub before: Option<Value>,
    /// Absent when the key was removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub after: Option<Value>,
}

/// Keys whose values differ between two object snapshots. A missing key is
/// distinct from an explicit `null`. Non-object snapshots have no keys.
pub fn diff_top_level(before: &Value, after: &Value) -> BTreeMap<String, FieldChange> {
    let empty = Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);

    before
        .keys()
        .chain(after.keys())
        .filter_map(|key| {
            let (old, new) = (before.get(key), after.get(key));
            (old != new).then(|| {
                let change = FieldChange {
                    before: old.cloned(),
                    after: new.cloned(),
                };
                (key.clone(), change)
            })
        })
        .collect()
}

/// Entry plus its computed `changes`, as returned by the read API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditLogView {
    #[serde(flatten)]
    pub entry: AuditLogEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<BTreeMap<String, FieldChange>>,
}

impl From<AuditLogEntry> for AuditLogView {
    fn from(entry: AuditLogEntry) -> Self {
        let changes = entry.changes();
        Self { entry, changes }
    }
}

// =============================================================================
// QUERIES
// =============================================================================

/// Inclusive date window; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub resource: Option<AuditResource>,
    pub status: Option<AuditStatus>,
    pub actor_id: Option<Uuid>,
    pub window: DateWindow,
    pub search: Option<String>,
}

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Page is at least 1; limit is clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(page: PageRequest, total: i64) -> Self {
        let limit = i64::from(page.limit);
        Self {
            page: page.page,
            limit: page.limit,
            total,
            pages: (total + limit - 1) / limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditPage {
    pub entries: Vec<AuditLogEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditPageResponse {
    pub data: Vec<AuditLogView>,
    pub pagination: Pagination,
}

impl From<AuditPage> for AuditPageResponse {
    fn from(page: AuditPage) -> Self {
        Self {
            data: page.entries.into_iter().map(AuditLogView::from).collect(),
            pagination: page.pagination,
        }
    }
}

/// Raw query-string form of the list filters.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditListQuery {
    pub action: Option<String>,
    pub resource: Option<String>,
    pub status: Option<String>,
    pub user_id: Option<Uuid>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`
    pub start_date: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD` (whole day included)
    pub end_date: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditStatsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Dashboard aggregate over a date window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct AuditStats {
    pub total: i64,
    pub by_action: BTreeMap<String, i64>,
    pub by_resource: BTreeMap<String, i64>,
    pub by_status: BTreeMap<String, i64>,
    pub unique_users: i64,
}
