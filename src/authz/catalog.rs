//! Permission catalog and the role → permission map.
//!
//! The map is built once behind a [`OnceLock`] and only ever handed out as
//! `&'static` references. `super_admin` is never enumerated here: its set is
//! derived from [`CATALOG`] when the map is built.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

use super::role::Role;

/// Well-known permission names, grouped by resource domain.
pub mod permissions {
    // Users
    pub const USERS_VIEW: &str = "users:view";
    pub const USERS_CREATE: &str = "users:create";
    pub const USERS_EDIT: &str = "users:edit";
    pub const USERS_DELETE: &str = "users:delete";
    pub const USERS_MANAGE_ROLES: &str = "users:manage_roles";
    pub const USERS_SUSPEND: &str = "users:suspend";

    // Products
    pub const PRODUCTS_VIEW: &str = "products:view";
    pub const PRODUCTS_CREATE: &str = "products:create";
    pub const PRODUCTS_EDIT: &str = "products:edit";
    pub const PRODUCTS_DELETE: &str = "products:delete";
    pub const PRODUCTS_MANAGE_INVENTORY: &str = "products:manage_inventory";

    // Courses
    pub const COURSES_VIEW: &str = "courses:view";
    pub const COURSES_CREATE: &str = "courses:create";
    pub const COURSES_EDIT: &str = "courses:edit";
    pub const COURSES_DELETE: &str = "courses:delete";
    pub const COURSES_MANAGE_ENROLLMENTS: &str = "courses:manage_enrollments";
    pub const COURSES_VIEW_PROGRESS: &str = "courses:view_progress";

    // Orders
    pub const ORDERS_VIEW: &str = "orders:view";
    pub const ORDERS_VIEW_OWN: &str = "orders:view_own";
    pub const ORDERS_CREATE: &str = "orders:create";
    pub const ORDERS_EDIT: &str = "orders:edit";
    pub const ORDERS_DELETE: &str = "orders:delete";
    pub const ORDERS_REFUND: &str = "orders:refund";
    pub const ORDERS_EXPORT: &str = "orders:export";

    // Content
    pub const CONTENT_VIEW: &str = "content:view";
    pub const CONTENT_CREATE: &str = "content:create";
    pub const CONTENT_EDIT: &str = "content:edit";
    pub const CONTENT_DELETE: &str = "content:delete";
    pub const CONTENT_PUBLISH: &str = "content:publish";

    // Support: tickets, contact messages, quotes, job applications, chatbot
    pub const SUPPORT_VIEW_TICKETS: &str = "support:view_tickets";
    pub const SUPPORT_CREATE_TICKET: &str = "support:create_ticket";
    pub const SUPPORT_RESPOND: &str = "support:respond";
    pub const SUPPORT_MANAGE_TICKETS: &str = "support:manage_tickets";
    pub const SUPPORT_VIEW_MESSAGES: &str = "support:view_messages";
    pub const SUPPORT_MANAGE_MESSAGES: &str = "support:manage_messages";
    pub const SUPPORT_MANAGE_QUOTES: &str = "support:manage_quotes";
    pub const SUPPORT_MANAGE_APPLICATIONS: &str = "support:manage_applications";
    pub const SUPPORT_MANAGE_CHATBOT: &str = "support:manage_chatbot";

    // Forum
    pub const FORUM_VIEW: &str = "forum:view";
    pub const FORUM_POST: &str = "forum:post";
    pub const FORUM_COMMENT: &str = "forum:comment";
    pub const FORUM_EDIT_OWN: &str = "forum:edit_own";
    pub const FORUM_MODERATE: &str = "forum:moderate";
    pub const FORUM_DELETE: &str = "forum:delete";
    pub const FORUM_PIN: &str = "forum:pin";

    // Settings
    pub const SETTINGS_VIEW: &str = "settings:view";
    pub const SETTINGS_EDIT: &str = "settings:edit";
    pub const SETTINGS_MANAGE_BACKUPS: &str = "settings:manage_backups";
    pub const SETTINGS_SYSTEM_CONFIG: &str = "settings:system_config";

    // Analytics
    pub const ANALYTICS_VIEW: &str = "analytics:view";
    pub const ANALYTICS_EXPORT: &str = "analytics:export";

    // Audit
    pub const AUDIT_VIEW: &str = "audit:view";
    pub const AUDIT_EXPORT: &str = "audit:export";
}

use permissions::*;

/// Every permission the platform knows about.
pub const CATALOG: &[&str] = &[
    USERS_VIEW,
    USERS_CREATE,
    USERS_EDIT,
    USERS_DELETE,
    USERS_MANAGE_ROLES,
    USERS_SUSPEND,
    PRODUCTS_VIEW,
    PRODUCTS_CREATE,
    PRODUCTS_EDIT,
    PRODUCTS_DELETE,
    PRODUCTS_MANAGE_INVENTORY,
    COURSES_VIEW,
    COURSES_CREATE,
    COURSES_EDIT,
    COURSES_DELETE,
    COURSES_MANAGE_ENROLLMENTS,
    COURSES_VIEW_PROGRESS,
    ORDERS_VIEW,
    ORDERS_VIEW_OWN,
    ORDERS_CREATE,
    ORDERS_EDIT,
    ORDERS_DELETE,
    ORDERS_REFUND,
    ORDERS_EXPORT,
    CONTENT_VIEW,
    CONTENT_CREATE,
    CONTENT_EDIT,
    CONTENT_DELETE,
    CONTENT_PUBLISH,
    SUPPORT_VIEW_TICKETS,
    SUPPORT_CREATE_TICKET,
    SUPPORT_RESPOND,
    SUPPORT_MANAGE_TICKETS,
    SUPPORT_VIEW_MESSAGES,
    SUPPORT_MANAGE_MESSAGES,
    SUPPORT_MANAGE_QUOTES,
    SUPPORT_MANAGE_APPLICATIONS,
    SUPPORT_MANAGE_CHATBOT,
    FORUM_VIEW,
    FORUM_POST,
    FORUM_COMMENT,
    FORUM_EDIT_OWN,
    FORUM_MODERATE,
    FORUM_DELETE,
    FORUM_PIN,
    SETTINGS_VIEW,
    SETTINGS_EDIT,
    SETTINGS_MANAGE_BACKUPS,
    SETTINGS_SYSTEM_CONFIG,
    ANALYTICS_VIEW,
    ANALYTICS_EXPORT,
    AUDIT_VIEW,
    AUDIT_EXPORT,
];

const CLIENT_PERMISSIONS: &[&str] = &[
    PRODUCTS_VIEW,
    ORDERS_VIEW_OWN,
    ORDERS_CREATE,
    CONTENT_VIEW,
    SUPPORT_CREATE_TICKET,
    FORUM_VIEW,
    FORUM_POST,
    FORUM_COMMENT,
    FORUM_EDIT_OWN,
];

const STUDENT_PERMISSIONS: &[&str] = &[
    PRODUCTS_VIEW,
    ORDERS_VIEW_OWN,
    ORDERS_CREATE,
    CONTENT_VIEW,
    SUPPORT_CREATE_TICKET,
    FORUM_VIEW,
    FORUM_POST,
    FORUM_COMMENT,
    FORUM_EDIT_OWN,
    COURSES_VIEW,
    COURSES_VIEW_PROGRESS,
];

const MODERATOR_PERMISSIONS: &[&str] = &[
    USERS_VIEW,
    PRODUCTS_VIEW,
    COURSES_VIEW,
    ORDERS_VIEW,
    CONTENT_VIEW,
    CONTENT_CREATE,
    CONTENT_EDIT,
    SUPPORT_VIEW_TICKETS,
    SUPPORT_RESPOND,
    SUPPORT_VIEW_MESSAGES,
    FORUM_VIEW,
    FORUM_POST,
    FORUM_COMMENT,
    FORUM_EDIT_OWN,
    FORUM_MODERATE,
    FORUM_DELETE,
    FORUM_PIN,
    ANALYTICS_VIEW,
];

const ADMIN_PERMISSIONS: &[&str] = &[
    USERS_VIEW,
    USERS_CREATE,
    USERS_EDIT,
    USERS_DELETE,
    USERS_MANAGE_ROLES,
    USERS_SUSPEND,
    PRODUCTS_VIEW,
    PRODUCTS_CREATE,
    PRODUCTS_EDIT,
    PRODUCTS_DELETE,
    PRODUCTS_MANAGE_INVENTORY,
    COURSES_VIEW,
    COURSES_CREATE,
    COURSES_EDIT,
    COURSES_DELETE,
    COURSES_MANAGE_ENROLLMENTS,
    COURSES_VIEW_PROGRESS,
    ORDERS_VIEW,
    ORDERS_VIEW_OWN,
    ORDERS_CREATE,
    ORDERS_EDIT,
    ORDERS_DELETE,
    ORDERS_REFUND,
    ORDERS_EXPORT,
    CONTENT_VIEW,
    CONTENT_CREATE,
    CONTENT_EDIT,
    CONTENT_DELETE,
    CONTENT_PUBLISH,
    SUPPORT_VIEW_TICKETS,
    SUPPORT_CREATE_TICKET,
    SUPPORT_RESPOND,
    SUPPORT_MANAGE_TICKETS,
    SUPPORT_VIEW_MESSAGES,
    SUPPORT_MANAGE_MESSAGES,
    SUPPORT_MANAGE_QUOTES,
    SUPPORT_MANAGE_APPLICATIONS,
    SUPPORT_MANAGE_CHATBOT,
    FORUM_VIEW,
    FORUM_POST,
    FORUM_COMMENT,
    FORUM_EDIT_OWN,
    FORUM_MODERATE,
    FORUM_DELETE,
    FORUM_PIN,
    SETTINGS_VIEW,
    SETTINGS_EDIT,
    ANALYTICS_VIEW,
    ANALYTICS_EXPORT,
    AUDIT_VIEW,
    AUDIT_EXPORT,
];

/// Hand-maintained grants. `super_admin` must not appear here.
pub const DEFAULT_GRANTS: &[(Role, &[&str])] = &[
    (Role::Client, CLIENT_PERMISSIONS),
    (Role::Student, STUDENT_PERMISSIONS),
    (Role::Moderator, MODERATOR_PERMISSIONS),
    (Role::Admin, ADMIN_PERMISSIONS),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("role {role} references unknown permission {permission}")]
    UnknownPermission { role: Role, permission: String },
    #[error("permission {0} is listed more than once in the catalog")]
    DuplicatePermission(String),
    #[error("super_admin permissions are derived from the catalog and must not be enumerated")]
    EnumeratedSuperAdmin,
}

/// Immutable role → permission lookup.
#[derive(Debug)]
pub struct RolePermissionMap {
    grants: HashMap<Role, BTreeSet<&'static str>>,
    catalog: BTreeSet<&'static str>,
}

impl RolePermissionMap {
    pub fn build(
        catalog: &[&'static str],
        grants: &[(Role, &[&'static str])],
    ) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(catalog.len());
        for permission in catalog {
            if !seen.insert(*permission) {
                return Err(CatalogError::DuplicatePermission(permission.to_string()));
            }
        }
        let catalog: BTreeSet<&'static str> = catalog.iter().copied().collect();

        let mut map = HashMap::new();
        for (role, permissions) in grants {
            if *role == Role::SuperAdmin {
                return Err(CatalogError::EnumeratedSuperAdmin);
            }
            let mut set = BTreeSet::new();
            for permission in *permissions {
                if !catalog.contains(permission) {
                    return Err(CatalogError::UnknownPermission {
                        role: *role,
                        permission: permission.to_string(),
                    });
                }
                set.insert(*permission);
            }
            map.entry(*role).or_insert_with(BTreeSet::new).extend(set);
        }
        map.insert(Role::SuperAdmin, catalog.clone());

        Ok(Self { grants: map, catalog })
    }

    pub fn permissions_for(&self, role: Role) -> Option<&BTreeSet<&'static str>> {
        self.grants.get(&role)
    }

    pub fn catalog(&self) -> &BTreeSet<&'static str> {
        &self.catalog
    }
}

static ROLE_MAP: OnceLock<Result<RolePermissionMap, CatalogError>> = OnceLock::new();

fn built() -> &'static Result<RolePermissionMap, CatalogError> {
    ROLE_MAP.get_or_init(|| RolePermissionMap::build(CATALOG, DEFAULT_GRANTS))
}

/// Builds and verifies the process-wide map. Called once at startup so an
/// integrity violation aborts boot instead of surfacing as silent denials.
pub fn init() -> Result<&'static RolePermissionMap, CatalogError> {
    built().as_ref().map_err(|err| err.clone())
}

/// The process-wide map, or `None` if it failed integrity checks.
pub fn role_map() -> Option<&'static RolePermissionMap> {
    match built() {
        Ok(map) => Some(map),
        Err(err) => {
            tracing::error!(error = %err, "permission catalog failed integrity checks; denying");
            None
        }
    }
}

pub fn is_catalog_permission(permission: &str) -> bool {
    CATALOG.contains(&permission)
}
