//! 角色注册表
//! 角色增删改查与继承关系校验（无环、父角色存在、删除冲突）

use crate::{
    error::{AppError, Result},
    models::Role,
    repository::AuthzStore,
    services::graph,
};
use std::sync::Arc;

pub struct RoleRegistry {
    store: Arc<dyn AuthzStore>,
    manage_permission: String,
    fallback_role: String,
}

impl RoleRegistry {
    pub fn new(
        store: Arc<dyn AuthzStore>,
        manage_permission: impl Into<String>,
        fallback_role: impl Into<String>,
    ) -> Self {
        Self {
            store,
            manage_permission: manage_permission.into(),
            fallback_role: fallback_role.into(),
        }
    }

    /// 列出所有角色（按 id 排序）
    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        self.store.list_roles().await
    }

    /// 根据 id 获取角色
    pub async fn get_role(&self, id: &str) -> Result<Role> {
        self.store
            .get_role(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Role '{}'", id)))
    }

    /// 创建或替换角色定义
    ///
    /// 校验与写入在存储的同一把锁/事务中完成，并发编辑无法在两者之间插入环。
    pub async fn upsert_role(&self, role: Role) -> Result<Role> {
        let mut role = role;
        role.id = role.id.trim().to_string();
        role.name = role.name.trim().to_string();

        self.store
            .upsert_role(&role, &|current| graph::validate_role(current, &role))
            .await?;

        tracing::info!(
            role_id = %role.id,
            parents = ?role.inherits,
            "Role saved"
        );

        Ok(role)
    }

    /// 删除角色；默认角色、被继承或已分配的角色以及最后一个管理角色不可删除
    pub async fn delete_role(&self, id: &str) -> Result<()> {
        let manage_permission = self.manage_permission.as_str();
        let fallback_role = self.fallback_role.as_str();

        self.store
            .delete_role(id, &|snapshot| {
                graph::check_removable(snapshot, id, manage_permission, fallback_role)
            })
            .await?;

        tracing::info!(role_id = %id, "Role deleted");
        Ok(())
    }
}
