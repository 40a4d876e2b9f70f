//! User role assignment models

use super::role::RoleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// One active role per user (last write wins)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRoleAssignment {
    pub user_id: Uuid,
    pub role_id: RoleId,
    pub assigned_at: DateTime<Utc>,
}

/// Assign role request
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AssignRoleRequest {
    #[validate(length(min = 1, max = 64))]
    pub role_id: RoleId,
}

/// Resolved role of a user
#[derive(Debug, Serialize)]
pub struct UserRoleResponse {
    pub user_id: Uuid,
    pub role_id: RoleId,
    /// false when the user has no assignment and got the fallback role
    pub assigned: bool,
}
