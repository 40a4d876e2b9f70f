//! 权限检查服务
//! 组合目录、角色、引擎与分配；HTTP 层只通过这里做用户级权限判定

use crate::{
    config::AuthzConfig,
    error::Result,
    models::{PermissionKey, RoleId},
    repository::AuthzStore,
    services::{
        assignment_service::RoleAssignments,
        authz_service::{AuthorizationEngine, CriticalPolicy, GrantEditor},
        catalog_service::PermissionCatalog,
        role_service::RoleRegistry,
    },
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 单个用户的有效权限
#[derive(Debug, Clone, Serialize)]
pub struct UserPermissions {
    pub user_id: Uuid,
    pub role_id: RoleId,
    pub assigned: bool,
    pub permissions: Vec<PermissionKey>,
}

pub struct PermissionService {
    pub catalog: Arc<PermissionCatalog>,
    pub roles: Arc<RoleRegistry>,
    pub engine: Arc<AuthorizationEngine>,
    pub assignments: Arc<RoleAssignments>,
    manage_permission: PermissionKey,
}

impl PermissionService {
    pub fn new(store: Arc<dyn AuthzStore>, config: &AuthzConfig) -> Self {
        let catalog = Arc::new(PermissionCatalog::new(
            store.clone(),
            Duration::from_secs(config.catalog_cache_ttl_secs),
            &config.manage_permission,
        ));
        let roles = Arc::new(RoleRegistry::new(
            store.clone(),
            &config.manage_permission,
            &config.fallback_role,
        ));
        let engine = Arc::new(AuthorizationEngine::new(
            store.clone(),
            catalog.clone(),
            CriticalPolicy::from_config(config),
            &config.manage_permission,
        ));
        let assignments = Arc::new(RoleAssignments::new(store, &config.fallback_role));

        Self {
            catalog,
            roles,
            engine,
            assignments,
            manage_permission: config.manage_permission.clone(),
        }
    }

    pub fn manage_permission(&self) -> &str {
        &self.manage_permission
    }

    /// 检查用户是否拥有权限
    pub async fn check_permission(&self, user_id: Uuid, key: &str) -> Result<bool> {
        let role_id = self.assignments.resolve_role(user_id).await?;
        self.engine.can(&role_id, key).await
    }

    /// 检查权限，如果无权限则返回错误
    pub async fn require_permission(&self, user_id: Uuid, key: &str) -> Result<RoleId> {
        let role_id = self.assignments.resolve_role(user_id).await?;

        if let Err(e) = self.engine.require(&role_id, key).await {
            tracing::warn!(user_id = %user_id, permission = %key, "Permission denied for user");
            return Err(e);
        }

        Ok(role_id)
    }

    /// 管理接口的统一门禁；返回调用者作为授权编辑者的身份
    pub async fn require_manage(&self, user_id: Uuid) -> Result<GrantEditor> {
        let role_id = self.require_permission(user_id, &self.manage_permission).await?;
        Ok(GrantEditor::Role(role_id))
    }

    /// 获取用户的有效权限
    pub async fn get_user_permissions(&self, user_id: Uuid) -> Result<UserPermissions> {
        let (role_id, assigned) = self.assignments.resolve(user_id).await?;
        let permissions = self.engine.effective_grants(&role_id).await?;

        Ok(UserPermissions {
            user_id,
            role_id,
            assigned,
            permissions: permissions.into_iter().collect(),
        })
    }
}
