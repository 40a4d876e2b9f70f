//! 权限目录服务
//! 提供分组列表与 O(1) 的权限键校验；键集合在进程内缓存

use crate::{
    error::{AppError, Result},
    models::{is_well_formed_key, Permission, PermissionGroup, PermissionKey},
    repository::AuthzStore,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// 目录内容及由其展开的权限键集合
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    groups: Vec<PermissionGroup>,
    keys: HashSet<PermissionKey>,
}

impl CatalogSnapshot {
    pub fn new(groups: Vec<PermissionGroup>) -> Self {
        let keys = groups
            .iter()
            .flat_map(|g| g.permissions.iter().map(|p| p.key.clone()))
            .collect();
        Self { groups, keys }
    }

    pub fn groups(&self) -> &[PermissionGroup] {
        &self.groups
    }

    pub fn keys(&self) -> &HashSet<PermissionKey> {
        &self.keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

struct CachedCatalog {
    snapshot: Arc<CatalogSnapshot>,
    loaded_at: Instant,
}

pub struct PermissionCatalog {
    store: Arc<dyn AuthzStore>,
    cache: RwLock<Option<CachedCatalog>>,
    ttl: Duration,
    /// 管理权限本身，不能从目录删除
    manage_permission: PermissionKey,
}

impl PermissionCatalog {
    pub fn new(
        store: Arc<dyn AuthzStore>,
        ttl: Duration,
        manage_permission: impl Into<PermissionKey>,
    ) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
            ttl,
            manage_permission: manage_permission.into(),
        }
    }

    /// 当前目录（优先使用未过期的缓存）
    pub async fn snapshot(&self) -> Result<Arc<CatalogSnapshot>> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.loaded_at.elapsed() < self.ttl {
                return Ok(cached.snapshot.clone());
            }
        }

        self.refresh().await
    }

    /// 丢弃缓存并从存储重新加载
    pub async fn refresh(&self) -> Result<Arc<CatalogSnapshot>> {
        let groups = self.store.list_groups().await?;
        let snapshot = Arc::new(CatalogSnapshot::new(groups));

        *self.cache.write().await = Some(CachedCatalog {
            snapshot: snapshot.clone(),
            loaded_at: Instant::now(),
        });

        tracing::debug!(keys = snapshot.keys().len(), "Permission catalog loaded");
        Ok(snapshot)
    }

    async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// 列出所有权限分组（保持插入顺序）
    pub async fn list_groups(&self) -> Result<Vec<PermissionGroup>> {
        Ok(self.snapshot().await?.groups().to_vec())
    }

    /// 检查权限键是否存在于目录中
    pub async fn is_valid_key(&self, key: &str) -> Result<bool> {
        Ok(self.snapshot().await?.contains(key))
    }

    /// 所有权限键（排序后）
    pub async fn all_keys(&self) -> Result<BTreeSet<PermissionKey>> {
        Ok(self.snapshot().await?.keys().iter().cloned().collect())
    }

    /// 向分组追加权限，分组不存在时创建
    pub async fn add_permission(
        &self,
        group_title: &str,
        key: &str,
        label: &str,
    ) -> Result<Permission> {
        let group_title = group_title.trim();
        let label = label.trim();

        if group_title.is_empty() {
            return Err(AppError::validation("Permission group title must not be empty"));
        }
        if label.is_empty() {
            return Err(AppError::validation("Permission label must not be empty"));
        }
        if !is_well_formed_key(key) {
            return Err(AppError::Validation(format!("Invalid permission key '{}'", key)));
        }

        let permission = Permission::new(key, label);
        let result = self.store.insert_permission(group_title, &permission).await;
        self.invalidate().await;
        result?;

        tracing::info!(key = %key, group = %group_title, "Permission added to catalog");
        Ok(permission)
    }

    /// 删除权限，并从所有角色的直接授权中清除
    pub async fn remove_permission(&self, key: &str) -> Result<u64> {
        if key == self.manage_permission {
            return Err(AppError::Conflict(format!(
                "Permission '{}' guards the admin endpoints and cannot be removed",
                key
            )));
        }

        let result = self.store.remove_permission(key).await;
        self.invalidate().await;
        let cleaned = result?;

        tracing::info!(key = %key, cleaned_grants = cleaned, "Permission removed from catalog");
        Ok(cleaned)
    }
}
