//! Role and grant domain models

use super::permission::PermissionKey;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use validator::Validate;

/// Unique role identifier, e.g. `admin`, `coach`.
pub type RoleId = String;

static ROLE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").expect("valid regex"));

/// Whether `id` is usable as a role id (non-empty, no whitespace or separators).
pub fn is_valid_role_id(id: &str) -> bool {
    id.len() <= 64 && ROLE_ID_RE.is_match(id)
}

/// Role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Parent roles whose grants this role receives transitively.
    #[serde(default)]
    pub inherits: BTreeSet<RoleId>,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            inherits: BTreeSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn inheriting<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inherits = parents.into_iter().map(Into::into).collect();
        self
    }
}

/// Create or replace role request (the id comes from the path)
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpsertRoleRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 1024))]
    pub description: String,
    #[serde(default)]
    #[validate(length(max = 64))]
    pub inherits: Vec<RoleId>,
}

impl UpsertRoleRequest {
    pub fn into_role(self, id: &str) -> Role {
        Role {
            id: id.to_string(),
            name: self.name,
            description: self.description,
            inherits: self.inherits.into_iter().collect(),
        }
    }
}

/// Replace direct grants request
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SetPermissionsRequest {
    #[validate(length(max = 1024))]
    pub permissions: Vec<String>,
}

/// Direct and effective grants of one role
#[derive(Debug, Serialize)]
pub struct RolePermissionsResponse {
    pub role_id: RoleId,
    pub direct: Vec<PermissionKey>,
    pub effective: Vec<PermissionKey>,
}
