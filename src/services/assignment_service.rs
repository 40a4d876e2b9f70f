//! 用户角色分配
//! 每个用户一个角色，未分配时回落到默认角色

use crate::{
    error::{AppError, Result},
    models::{RoleId, UserRoleAssignment},
    repository::AuthzStore,
};
use std::sync::Arc;
use uuid::Uuid;

pub struct RoleAssignments {
    store: Arc<dyn AuthzStore>,
    fallback_role: RoleId,
}

impl RoleAssignments {
    pub fn new(store: Arc<dyn AuthzStore>, fallback_role: impl Into<RoleId>) -> Self {
        Self {
            store,
            fallback_role: fallback_role.into(),
        }
    }

    pub fn fallback_role(&self) -> &str {
        &self.fallback_role
    }

    /// 用户当前角色；第二个值表示是否为显式分配
    pub async fn resolve(&self, user_id: Uuid) -> Result<(RoleId, bool)> {
        match self.store.get_assignment(user_id).await? {
            Some(assignment) => Ok((assignment.role_id, true)),
            None => Ok((self.fallback_role.clone(), false)),
        }
    }

    /// 用户当前角色 id
    pub async fn resolve_role(&self, user_id: Uuid) -> Result<RoleId> {
        Ok(self.resolve(user_id).await?.0)
    }

    /// 为用户分配角色（覆盖之前的分配）
    pub async fn assign(&self, user_id: Uuid, role_id: &str) -> Result<UserRoleAssignment> {
        let role_id = role_id.trim();
        if role_id.is_empty() {
            return Err(AppError::validation("Role id must not be empty"));
        }

        let assignment = self.store.assign_role(user_id, role_id).await?;

        tracing::info!(user_id = %user_id, role_id = %role_id, "Role assigned");
        Ok(assignment)
    }

    /// 撤销用户的角色分配，用户回落到默认角色
    pub async fn unassign(&self, user_id: Uuid) -> Result<bool> {
        let removed = self.store.remove_assignment(user_id).await?;

        if removed {
            tracing::info!(user_id = %user_id, "Role assignment removed");
        }
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<UserRoleAssignment>> {
        self.store.list_assignments().await
    }
}
