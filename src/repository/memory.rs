//! 内存存储
//! 测试和未配置数据库时使用；单个读写锁保证每次写入的原子性

use super::{
    AuthzSnapshot, AuthzStore, GrantContext, GrantPlan, GrantUpdate, GraphCheck, RoleCheck,
    RoleGraph,
};
use crate::{
    error::{AppError, Result},
    models::{Permission, PermissionGroup, PermissionKey, Role, RoleId, UserRoleAssignment},
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    groups: Vec<PermissionGroup>,
    roles: BTreeMap<RoleId, Role>,
    grants: HashMap<RoleId, BTreeSet<PermissionKey>>,
    assignments: HashMap<Uuid, UserRoleAssignment>,
}

impl MemoryState {
    fn graph(&self) -> RoleGraph {
        RoleGraph {
            roles: self.roles.clone(),
            grants: self.grants.clone(),
        }
    }

    fn snapshot(&self) -> AuthzSnapshot {
        let mut assigned_users: HashMap<RoleId, usize> = HashMap::new();
        for assignment in self.assignments.values() {
            *assigned_users.entry(assignment.role_id.clone()).or_default() += 1;
        }

        AuthzSnapshot {
            graph: self.graph(),
            assigned_users,
        }
    }

    fn catalog_keys(&self) -> HashSet<PermissionKey> {
        self.groups
            .iter()
            .flat_map(|group| group.permissions.iter().map(|p| p.key.clone()))
            .collect()
    }

    fn has_permission(&self, key: &str) -> bool {
        self.groups
            .iter()
            .any(|group| group.permissions.iter().any(|p| p.key == key))
    }
}

/// 进程内的 `AuthzStore`
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置权限目录的存储
    pub fn with_catalog(groups: Vec<PermissionGroup>) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                groups,
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl AuthzStore for MemoryStore {
    async fn list_groups(&self) -> Result<Vec<PermissionGroup>> {
        Ok(self.state.read().await.groups.clone())
    }

    async fn insert_permission(&self, group_title: &str, permission: &Permission) -> Result<()> {
        let mut state = self.state.write().await;

        if state.has_permission(&permission.key) {
            return Err(AppError::Conflict(format!(
                "Permission '{}' already exists",
                permission.key
            )));
        }

        match state.groups.iter_mut().find(|g| g.title == group_title) {
            Some(group) => group.permissions.push(permission.clone()),
            None => state
                .groups
                .push(PermissionGroup::new(group_title, vec![permission.clone()])),
        }

        Ok(())
    }

    async fn remove_permission(&self, key: &str) -> Result<u64> {
        let mut state = self.state.write().await;

        if !state.has_permission(key) {
            return Err(AppError::NotFound(format!("Permission '{}'", key)));
        }

        for group in state.groups.iter_mut() {
            group.permissions.retain(|p| p.key != key);
        }

        let mut cleaned = 0;
        for keys in state.grants.values_mut() {
            if keys.remove(key) {
                cleaned += 1;
            }
        }

        Ok(cleaned)
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        Ok(self.state.read().await.roles.values().cloned().collect())
    }

    async fn get_role(&self, id: &str) -> Result<Option<Role>> {
        Ok(self.state.read().await.roles.get(id).cloned())
    }

    async fn role_graph(&self) -> Result<RoleGraph> {
        Ok(self.state.read().await.graph())
    }

    async fn upsert_role(&self, role: &Role, check: GraphCheck<'_>) -> Result<()> {
        let mut state = self.state.write().await;
        check(&state.graph())?;
        state.roles.insert(role.id.clone(), role.clone());
        Ok(())
    }

    async fn delete_role(&self, id: &str, check: RoleCheck<'_>) -> Result<()> {
        let mut state = self.state.write().await;
        check(&state.snapshot())?;

        if state.roles.remove(id).is_none() {
            return Err(AppError::NotFound(format!("Role '{}'", id)));
        }
        state.grants.remove(id);

        Ok(())
    }

    async fn direct_grants(&self, role_id: &str) -> Result<BTreeSet<PermissionKey>> {
        Ok(self
            .state
            .read()
            .await
            .grants
            .get(role_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_grants(&self, role_id: &str, update: GrantUpdate<'_>) -> Result<GrantPlan> {
        let mut state = self.state.write().await;

        if !state.roles.contains_key(role_id) {
            return Err(AppError::NotFound(format!("Role '{}'", role_id)));
        }

        let graph = state.graph();
        let catalog = state.catalog_keys();
        let current = graph.direct_grants(role_id).cloned().unwrap_or_default();

        let plan = update(&GrantContext {
            role_id,
            current: &current,
            graph: &graph,
            catalog: &catalog,
        })?;
        state.grants.insert(role_id.to_string(), plan.grants.clone());

        Ok(plan)
    }

    async fn get_assignment(&self, user_id: Uuid) -> Result<Option<UserRoleAssignment>> {
        Ok(self.state.read().await.assignments.get(&user_id).cloned())
    }

    async fn assign_role(&self, user_id: Uuid, role_id: &str) -> Result<UserRoleAssignment> {
        let mut state = self.state.write().await;

        if !state.roles.contains_key(role_id) {
            return Err(AppError::NotFound(format!("Role '{}'", role_id)));
        }

        let assignment = UserRoleAssignment {
            user_id,
            role_id: role_id.to_string(),
            assigned_at: Utc::now(),
        };
        state.assignments.insert(user_id, assignment.clone());

        Ok(assignment)
    }

    async fn remove_assignment(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.state.write().await.assignments.remove(&user_id).is_some())
    }

    async fn list_assignments(&self) -> Result<Vec<UserRoleAssignment>> {
        let mut assignments: Vec<_> =
            self.state.read().await.assignments.values().cloned().collect();
        assignments.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at).then(a.user_id.cmp(&b.user_id)));
        Ok(assignments)
    }
}
