//! Permission catalog domain models

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Globally unique permission identifier, e.g. `articles.manage`.
///
/// The `domain.action` shape is a naming convention only; the engine treats
/// keys as opaque strings.
pub type PermissionKey = String;

static PERMISSION_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.:-]*$").expect("valid regex"));

/// Whether `key` is acceptable as a new catalog entry (non-empty, no whitespace).
pub fn is_well_formed_key(key: &str) -> bool {
    key.len() <= 128 && PERMISSION_KEY_RE.is_match(key)
}

/// Permission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub key: PermissionKey,
    pub label: String,
}

impl Permission {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// Display grouping of permissions (one section of the admin screen).
///
/// Group order and the order of permissions inside a group are preserved
/// for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGroup {
    pub title: String,
    pub permissions: Vec<Permission>,
}

impl PermissionGroup {
    pub fn new(title: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self {
            title: title.into(),
            permissions,
        }
    }
}

/// Add permission request
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreatePermissionRequest {
    #[validate(length(min = 1, max = 128))]
    pub group: String,
    #[validate(length(min = 1, max = 128))]
    pub key: String,
    #[validate(length(min = 1, max = 256))]
    pub label: String,
}

/// Catalog listing response
#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub groups: Vec<PermissionGroup>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_keys() {
        assert!(is_well_formed_key("articles.manage"));
        assert!(is_well_formed_key("users.view"));
        assert!(is_well_formed_key("legacy_flag"));
        assert!(!is_well_formed_key(""));
        assert!(!is_well_formed_key("articles manage"));
        assert!(!is_well_formed_key(".hidden"));
        assert!(!is_well_formed_key(&"a".repeat(129)));
    }

    #[test]
    fn test_create_permission_request_rejects_unknown_fields() {
        let json = r#"{"group":"Articles","key":"articles.view","label":"View","admin":true}"#;
        let result: Result<CreatePermissionRequest, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_create_permission_request_validation() {
        let req = CreatePermissionRequest {
            group: "Articles".to_string(),
            key: "articles.view".to_string(),
            label: String::new(),
        };
        assert!(req.validate().is_err());
    }
}
