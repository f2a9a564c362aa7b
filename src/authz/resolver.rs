//! Permission resolution over the frozen role map.
//!
//! Every check is fail-closed. The only unconditional allow is the single
//! `super_admin` branch in [`has_permission`].

use std::collections::BTreeSet;

use super::catalog::{is_catalog_permission, role_map};
use super::role::Role;

static NO_PERMISSIONS: BTreeSet<&'static str> = BTreeSet::new();

/// `role` may be a [`Role`] or a raw role name; unknown names resolve to
/// nothing.
pub fn has_permission(role: impl AsRef<str>, permission: &str) -> bool {
    let Some(role) = Role::parse(role.as_ref()) else {
        return false;
    };
    if permission.is_empty() {
        return false;
    }

    if role == Role::SuperAdmin {
        tracing::debug!(permission = %permission, "super_admin bypass");
        return true;
    }

    let allowed = get_role_permissions(role).contains(permission);
    if !allowed {
        tracing::debug!(role = %role, permission = %permission, "permission denied");
    }
    allowed
}

/// False on an empty list.
pub fn has_any_permission(role: impl AsRef<str>, permissions: &[&str]) -> bool {
    let role = role.as_ref();
    permissions.iter().any(|p| has_permission(role, p))
}

/// False on an empty list: an empty requirement set never authorizes.
pub fn has_all_permissions(role: impl AsRef<str>, permissions: &[&str]) -> bool {
    let role = role.as_ref();
    !permissions.is_empty() && permissions.iter().all(|p| has_permission(role, p))
}

pub fn get_role_permissions(role: impl AsRef<str>) -> &'static BTreeSet<&'static str> {
    Role::parse(role.as_ref())
        .and_then(|role| role_map()?.permissions_for(role))
        .unwrap_or(&NO_PERMISSIONS)
}

/// Resolves a loose `verb` on `resource` against the catalog.
///
/// Verb synonyms map onto the catalog's canonical verbs and singular
/// resource names onto their plural domain. When the composed permission is
/// not in the catalog the literal `"<resource>:<verb>"` string is tested as a
/// last resort; that branch can only succeed for `super_admin`.
pub fn can_perform_action(role: impl AsRef<str>, verb: &str, resource: &str) -> bool {
    let verb = verb.trim();
    let resource = resource.trim();
    if verb.is_empty() || resource.is_empty() {
        return false;
    }

    let domain = resource_domain(resource);
    if let Some(canonical) = canonical_verb(verb) {
        let composed = format!("{domain}:{canonical}");
        if is_catalog_permission(&composed) {
            return has_permission(role, &composed);
        }
    }

    // Last resort: the caller's literal pair, outside the catalog.
    has_permission(role, &format!("{resource}:{verb}"))
}

fn canonical_verb(verb: &str) -> Option<&'static str> {
    match verb.to_ascii_lowercase().as_str() {
        "create" | "add" => Some("create"),
        "read" | "view" | "list" | "get" => Some("view"),
        "update" | "edit" | "modify" => Some("edit"),
        "delete" | "remove" | "destroy" => Some("delete"),
        _ => None,
    }
}

fn resource_domain(resource: &str) -> String {
    let lower = resource.to_ascii_lowercase();
    match lower.as_str() {
        "user" => "users".to_string(),
        "product" => "products".to_string(),
        "course" => "courses".to_string(),
        "order" => "orders".to_string(),
        "setting" => "settings".to_string(),
        _ => lower,
    }
}
