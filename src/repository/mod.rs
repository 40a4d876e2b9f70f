//! 存储层
//! `AuthzStore` 抽象持久化的角色、授权、权限目录与用户角色分配；
//! 服务层只依赖该 trait，进程启动时构造一次并注入。

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::{
    error::Result,
    models::{Permission, PermissionGroup, PermissionKey, Role, RoleId, UserRoleAssignment},
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// 角色写入前的校验钩子，在与写入相同的锁/事务内执行
pub type GraphCheck<'a> = &'a (dyn Fn(&RoleGraph) -> Result<()> + Send + Sync);

/// 删除角色前的校验钩子；快照包含分配计数
pub type RoleCheck<'a> = &'a (dyn Fn(&AuthzSnapshot) -> Result<()> + Send + Sync);

/// 根据锁内状态计算角色新的直接授权
pub type GrantUpdate<'a> = &'a (dyn Fn(&GrantContext<'_>) -> Result<GrantPlan> + Send + Sync);

/// 继承图：角色定义与各角色的直接授权
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    pub roles: BTreeMap<RoleId, Role>,
    pub grants: HashMap<RoleId, BTreeSet<PermissionKey>>,
}

impl RoleGraph {
    pub fn role(&self, id: &str) -> Option<&Role> {
        self.roles.get(id)
    }

    pub fn direct_grants(&self, id: &str) -> Option<&BTreeSet<PermissionKey>> {
        self.grants.get(id)
    }

    /// 直接继承 `id` 的角色
    pub fn dependents_of(&self, id: &str) -> Vec<&RoleId> {
        self.roles
            .values()
            .filter(|role| role.inherits.contains(id))
            .map(|role| &role.id)
            .collect()
    }
}

/// 继承图加上每个角色的用户分配数，只在删除角色时构建
#[derive(Debug, Clone, Default)]
pub struct AuthzSnapshot {
    pub graph: RoleGraph,
    pub assigned_users: HashMap<RoleId, usize>,
}

impl AuthzSnapshot {
    pub fn assigned_user_count(&self, id: &str) -> usize {
        self.assigned_users.get(id).copied().unwrap_or(0)
    }
}

/// `update_grants` 闭包可见的锁内状态
pub struct GrantContext<'a> {
    pub role_id: &'a str,
    pub current: &'a BTreeSet<PermissionKey>,
    pub graph: &'a RoleGraph,
    /// 存储中的目录键，与写入处于同一事务
    pub catalog: &'a HashSet<PermissionKey>,
}

/// 授权写入计划；`grants` 整体替换角色的直接授权
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantPlan {
    pub grants: BTreeSet<PermissionKey>,
    /// 目录中不存在的请求键
    pub dropped_unknown: BTreeSet<String>,
    /// 编辑者无权修改、保持原状态的关键权限
    pub rejected_critical: BTreeSet<PermissionKey>,
    /// 为避免没有任何角色能管理权限而保留的键
    pub retained: BTreeSet<PermissionKey>,
}

/// 授权核心的持久化边界
///
/// 每次写入都是原子的：`upsert_role` / `delete_role` 的校验与写入共用一把锁
/// 或一个事务，`update_grants` 对单个角色做一次读-改-写。
#[async_trait]
pub trait AuthzStore: Send + Sync {
    // ==================== Catalog ====================

    async fn list_groups(&self) -> Result<Vec<PermissionGroup>>;

    /// 追加权限到分组，分组不存在时在末尾创建；键已存在返回 `Conflict`
    async fn insert_permission(&self, group_title: &str, permission: &Permission) -> Result<()>;

    /// 从目录和所有授权集合中删除 `key`，返回清理的授权条数
    async fn remove_permission(&self, key: &str) -> Result<u64>;

    // ==================== Roles ====================

    async fn list_roles(&self) -> Result<Vec<Role>>;

    async fn get_role(&self, id: &str) -> Result<Option<Role>>;

    /// 授权判定使用的继承图读取，不涉及用户分配
    async fn role_graph(&self) -> Result<RoleGraph>;

    async fn upsert_role(&self, role: &Role, check: GraphCheck<'_>) -> Result<()>;

    /// 删除角色及其直接授权
    async fn delete_role(&self, id: &str, check: RoleCheck<'_>) -> Result<()>;

    // ==================== Grants ====================

    async fn direct_grants(&self, role_id: &str) -> Result<BTreeSet<PermissionKey>>;

    /// 用 `update` 计算的集合替换角色的直接授权；未知角色返回 `NotFound`
    async fn update_grants(&self, role_id: &str, update: GrantUpdate<'_>) -> Result<GrantPlan>;

    // ==================== Assignments ====================

    async fn get_assignment(&self, user_id: Uuid) -> Result<Option<UserRoleAssignment>>;

    /// 角色不存在时返回 `NotFound`
    async fn assign_role(&self, user_id: Uuid, role_id: &str) -> Result<UserRoleAssignment>;

    async fn remove_assignment(&self, user_id: Uuid) -> Result<bool>;

    async fn list_assignments(&self) -> Result<Vec<UserRoleAssignment>>;
}
