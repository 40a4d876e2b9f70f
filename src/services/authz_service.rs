//! 授权引擎
//! 唯一的授权判定入口 `can(role, key)`，以及直接授权集合的整体替换

use crate::{
    config::AuthzConfig,
    error::{AppError, Result},
    models::{PermissionKey, RoleId},
    repository::{AuthzStore, GrantContext, GrantPlan},
    services::{catalog_service::PermissionCatalog, graph},
};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// 修改角色授权的编辑者
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantEditor {
    /// 初始化与维护代码，不受关键权限策略限制
    System,
    /// 以某个角色身份操作的管理员
    Role(RoleId),
}

/// 关键权限及允许增删它们的角色
///
/// 白名单在启动时由配置确定。
#[derive(Debug, Clone, Default)]
pub struct CriticalPolicy {
    critical: HashSet<PermissionKey>,
    editors: HashSet<RoleId>,
}

impl CriticalPolicy {
    pub fn new<K, E>(critical: K, editors: E) -> Self
    where
        K: IntoIterator<Item = PermissionKey>,
        E: IntoIterator<Item = RoleId>,
    {
        Self {
            critical: critical.into_iter().collect(),
            editors: editors.into_iter().collect(),
        }
    }

    pub fn from_config(config: &AuthzConfig) -> Self {
        Self::new(
            config.critical_permissions.iter().cloned(),
            config.critical_editors.iter().cloned(),
        )
    }

    pub fn is_critical(&self, key: &str) -> bool {
        self.critical.contains(key)
    }

    pub fn may_edit_critical(&self, editor: &GrantEditor) -> bool {
        match editor {
            GrantEditor::System => true,
            GrantEditor::Role(role_id) => self.editors.contains(role_id),
        }
    }
}

/// 授权替换结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantOutcome {
    pub role_id: RoleId,
    /// 写入后的直接授权，已排序
    pub permissions: Vec<PermissionKey>,
    /// 被拒绝修改、保持原状态的关键权限
    pub rejected_critical: Vec<PermissionKey>,
    /// 目录中不存在的请求键
    pub dropped_unknown: Vec<String>,
    /// 为保证仍有角色能管理权限而保留的键
    pub retained: Vec<PermissionKey>,
}

pub struct AuthorizationEngine {
    store: Arc<dyn AuthzStore>,
    catalog: Arc<PermissionCatalog>,
    policy: CriticalPolicy,
    manage_permission: PermissionKey,
}

impl AuthorizationEngine {
    pub fn new(
        store: Arc<dyn AuthzStore>,
        catalog: Arc<PermissionCatalog>,
        policy: CriticalPolicy,
        manage_permission: impl Into<PermissionKey>,
    ) -> Self {
        Self {
            store,
            catalog,
            policy,
            manage_permission: manage_permission.into(),
        }
    }

    pub fn policy(&self) -> &CriticalPolicy {
        &self.policy
    }

    /// 角色的直接授权；未知角色返回空集合
    pub async fn direct_grants(&self, role_id: &str) -> Result<BTreeSet<PermissionKey>> {
        self.store.direct_grants(role_id).await
    }

    /// 角色的有效授权（直接授权 + 所有继承的授权）
    ///
    /// 已从目录中移除的键不会生效。
    pub async fn effective_grants(&self, role_id: &str) -> Result<BTreeSet<PermissionKey>> {
        let graph = self.store.role_graph().await?;
        let catalog = self.catalog.snapshot().await?;

        let mut grants = graph::effective_grants(&graph, role_id);
        grants.retain(|key| catalog.contains(key));

        Ok(grants)
    }

    /// 授权判定
    pub async fn can(&self, role_id: &str, key: &str) -> Result<bool> {
        let granted = self.effective_grants(role_id).await?.contains(key);

        let outcome = if granted { "granted" } else { "denied" };
        metrics::counter!("authz_decisions_total", "outcome" => outcome).increment(1);

        tracing::debug!(role_id = %role_id, permission = %key, granted, "Authorization decision");
        Ok(granted)
    }

    /// 授权判定，无权限时返回 Forbidden
    pub async fn require(&self, role_id: &str, key: &str) -> Result<()> {
        if !self.can(role_id, key).await? {
            tracing::warn!(role_id = %role_id, permission = %key, "Permission denied");
            return Err(AppError::Forbidden);
        }
        Ok(())
    }

    /// 整体替换角色的直接授权
    ///
    /// 在存储的锁/事务内按当前目录过滤请求键（未知键静默丢弃）；编辑者不在白名单时，
    /// 关键权限保持原状态；若写入会让所有角色都失去管理权限，则保留该角色的管理权限。
    pub async fn set_direct_grants(
        &self,
        editor: &GrantEditor,
        role_id: &str,
        keys: &[String],
    ) -> Result<GrantOutcome> {
        let plan = self
            .store
            .update_grants(role_id, &|ctx| Ok(self.plan_grants(editor, keys, ctx)))
            .await?;

        if !plan.rejected_critical.is_empty() {
            tracing::warn!(
                role_id = %role_id,
                editor = ?editor,
                rejected = ?plan.rejected_critical,
                "Critical permission change refused"
            );
        }
        if !plan.retained.is_empty() {
            tracing::warn!(
                role_id = %role_id,
                editor = ?editor,
                retained = ?plan.retained,
                "Removal refused: no other role could manage permissions"
            );
        }
        if !plan.dropped_unknown.is_empty() {
            tracing::debug!(
                role_id = %role_id,
                dropped = ?plan.dropped_unknown,
                "Unknown permission keys dropped"
            );
        }

        tracing::info!(
            role_id = %role_id,
            editor = ?editor,
            count = plan.grants.len(),
            "Role permissions replaced"
        );

        Ok(GrantOutcome {
            role_id: role_id.to_string(),
            permissions: plan.grants.into_iter().collect(),
            rejected_critical: plan.rejected_critical.into_iter().collect(),
            dropped_unknown: plan.dropped_unknown.into_iter().collect(),
            retained: plan.retained.into_iter().collect(),
        })
    }

    /// 根据锁内状态计算新的直接授权
    fn plan_grants(&self, editor: &GrantEditor, keys: &[String], ctx: &GrantContext<'_>) -> GrantPlan {
        let mut plan = GrantPlan::default();

        let mut next: BTreeSet<PermissionKey> = BTreeSet::new();
        for key in keys {
            if ctx.catalog.contains(key) {
                next.insert(key.clone());
            } else {
                plan.dropped_unknown.insert(key.clone());
            }
        }

        if !self.policy.may_edit_critical(editor) {
            let toggled: BTreeSet<PermissionKey> = next
                .symmetric_difference(ctx.current)
                .filter(|key| self.policy.is_critical(key))
                .cloned()
                .collect();

            for key in toggled {
                if ctx.current.contains(&key) {
                    next.insert(key.clone());
                } else {
                    next.remove(&key);
                }
                plan.rejected_critical.insert(key);
            }
        }

        let manage = &self.manage_permission;
        if ctx.current.contains(manage)
            && !next.contains(manage)
            && graph::any_role_holds(ctx.graph, manage)
        {
            let mut after = ctx.graph.clone();
            after.grants.insert(ctx.role_id.to_string(), next.clone());

            if !graph::any_role_holds(&after, manage) {
                next.insert(manage.clone());
                plan.retained.insert(manage.clone());
            }
        }

        plan.grants = next;
        plan
    }
}
