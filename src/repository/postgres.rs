//! PostgreSQL 存储
//! 角色/授权/目录/分配四组表；校验与写入在同一事务内完成

use super::{
    AuthzSnapshot, AuthzStore, GrantContext, GrantPlan, GrantUpdate, GraphCheck, RoleCheck,
    RoleGraph,
};
use crate::{
    error::{AppError, Result},
    models::{Permission, PermissionGroup, PermissionKey, Role, UserRoleAssignment},
};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use uuid::Uuid;

pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// 读取角色定义（含父角色）
async fn load_roles(conn: &mut PgConnection) -> Result<BTreeMap<String, Role>> {
    let rows = sqlx::query_as::<_, (String, String, String)>(
        "SELECT id, name, description FROM roles ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut roles: BTreeMap<String, Role> = rows
        .into_iter()
        .map(|(id, name, description)| {
            let role = Role::new(id.clone(), name).with_description(description);
            (id, role)
        })
        .collect();

    let parents = sqlx::query_as::<_, (String, String)>(
        "SELECT role_id, parent_id FROM role_parents",
    )
    .fetch_all(&mut *conn)
    .await?;

    for (role_id, parent_id) in parents {
        if let Some(role) = roles.get_mut(&role_id) {
            role.inherits.insert(parent_id);
        }
    }

    Ok(roles)
}

/// 读取继承图：角色、继承边与直接授权
async fn load_graph(conn: &mut PgConnection) -> Result<RoleGraph> {
    let roles = load_roles(conn).await?;

    let grant_rows = sqlx::query_as::<_, (String, String)>(
        "SELECT role_id, permission_key FROM role_permissions",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut grants: HashMap<String, BTreeSet<PermissionKey>> = HashMap::new();
    for (role_id, key) in grant_rows {
        grants.entry(role_id).or_default().insert(key);
    }

    Ok(RoleGraph { roles, grants })
}

/// 继承图加上分配计数，仅供删除角色时的检查使用
async fn load_snapshot(conn: &mut PgConnection) -> Result<AuthzSnapshot> {
    let graph = load_graph(conn).await?;

    let count_rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT role_id, COUNT(*) FROM user_roles GROUP BY role_id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let assigned_users = count_rows
        .into_iter()
        .map(|(role_id, count)| (role_id, count.max(0) as usize))
        .collect();

    Ok(AuthzSnapshot {
        graph,
        assigned_users,
    })
}

#[async_trait]
impl AuthzStore for PgStore {
    async fn list_groups(&self) -> Result<Vec<PermissionGroup>> {
        let rows = sqlx::query_as::<_, (String, Option<String>, Option<String>)>(
            r#"
            SELECT g.title, p.permission_key, p.label
            FROM permission_groups g
            LEFT JOIN permissions p ON p.group_title = g.title
            ORDER BY g.position, p.position
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut groups: Vec<PermissionGroup> = Vec::new();
        for (title, key, label) in rows {
            if groups.last().map(|g| g.title != title).unwrap_or(true) {
                groups.push(PermissionGroup::new(title, Vec::new()));
            }
            if let (Some(key), Some(label), Some(group)) = (key, label, groups.last_mut()) {
                group.permissions.push(Permission::new(key, label));
            }
        }

        Ok(groups)
    }

    async fn insert_permission(&self, group_title: &str, permission: &Permission) -> Result<()> {
        let mut tx = self.db.begin().await?;

        // 串行化目录写入，保证 position 连续
        sqlx::query("LOCK TABLE permission_groups, permissions IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM permissions WHERE permission_key = $1",
        )
        .bind(&permission.key)
        .fetch_one(&mut *tx)
        .await?;

        if exists > 0 {
            return Err(AppError::Conflict(format!(
                "Permission '{}' already exists",
                permission.key
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO permission_groups (title, position)
            VALUES ($1, (SELECT COALESCE(MAX(position), -1) + 1 FROM permission_groups))
            ON CONFLICT (title) DO NOTHING
            "#,
        )
        .bind(group_title)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO permissions (permission_key, label, group_title, position)
            VALUES (
                $1, $2, $3,
                (SELECT COALESCE(MAX(position), -1) + 1 FROM permissions WHERE group_title = $3)
            )
            "#,
        )
        .bind(&permission.key)
        .bind(&permission.label)
        .bind(group_title)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_permission(&self, key: &str) -> Result<u64> {
        let mut tx = self.db.begin().await?;

        // 先锁住目录行：进行中的授权写入持有 FOR KEY SHARE，提交后再清理
        let locked = sqlx::query_scalar::<_, String>(
            "SELECT permission_key FROM permissions WHERE permission_key = $1 FOR UPDATE",
        )
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        if locked.is_none() {
            return Err(AppError::NotFound(format!("Permission '{}'", key)));
        }

        let cleaned = sqlx::query("DELETE FROM role_permissions WHERE permission_key = $1")
            .bind(key)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM permissions WHERE permission_key = $1")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(cleaned)
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let mut conn = self.db.acquire().await?;
        let roles = load_roles(&mut conn).await?;
        Ok(roles.into_values().collect())
    }

    async fn get_role(&self, id: &str) -> Result<Option<Role>> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            "SELECT id, name, description FROM roles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        let Some((id, name, description)) = row else {
            return Ok(None);
        };

        let parents = sqlx::query_scalar::<_, String>(
            "SELECT parent_id FROM role_parents WHERE role_id = $1",
        )
        .bind(&id)
        .fetch_all(&self.db)
        .await?;

        Ok(Some(
            Role::new(id, name)
                .with_description(description)
                .inheriting(parents),
        ))
    }

    async fn role_graph(&self) -> Result<RoleGraph> {
        let mut tx = self.db.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let graph = load_graph(&mut tx).await?;
        tx.commit().await?;

        Ok(graph)
    }

    async fn upsert_role(&self, role: &Role, check: GraphCheck<'_>) -> Result<()> {
        let mut tx = self.db.begin().await?;

        // 角色写入互斥，读取不受影响；校验期间继承图不会被并发修改
        sqlx::query("LOCK TABLE roles IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let graph = load_graph(&mut tx).await?;
        check(&graph)?;

        sqlx::query(
            r#"
            INSERT INTO roles (id, name, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                updated_at = NOW()
            "#,
        )
        .bind(&role.id)
        .bind(&role.name)
        .bind(&role.description)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM role_parents WHERE role_id = $1")
            .bind(&role.id)
            .execute(&mut *tx)
            .await?;

        let parents: Vec<String> = role.inherits.iter().cloned().collect();
        sqlx::query(
            "INSERT INTO role_parents (role_id, parent_id) SELECT $1, UNNEST($2::text[])",
        )
        .bind(&role.id)
        .bind(&parents)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_role(&self, id: &str, check: RoleCheck<'_>) -> Result<()> {
        let mut tx = self.db.begin().await?;

        // 加锁顺序与授权写入、用户分配一致：roles 表锁 → 角色行 → 关联表
        sqlx::query("LOCK TABLE roles IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let locked = sqlx::query_scalar::<_, String>("SELECT id FROM roles WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        if locked.is_none() {
            return Err(AppError::NotFound(format!("Role '{}'", id)));
        }

        sqlx::query("LOCK TABLE role_permissions, user_roles IN SHARE MODE")
            .execute(&mut *tx)
            .await?;

        let snapshot = load_snapshot(&mut tx).await?;
        check(&snapshot)?;

        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn direct_grants(&self, role_id: &str) -> Result<BTreeSet<PermissionKey>> {
        let keys = sqlx::query_scalar::<_, String>(
            "SELECT permission_key FROM role_permissions WHERE role_id = $1",
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await?;

        Ok(keys.into_iter().collect())
    }

    async fn update_grants(&self, role_id: &str, update: GrantUpdate<'_>) -> Result<GrantPlan> {
        let mut tx = self.db.begin().await?;

        // 与角色增删互斥；管理权限检查需要其他角色的授权在写入前后保持不变
        sqlx::query("LOCK TABLE roles IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let locked = sqlx::query_scalar::<_, String>("SELECT id FROM roles WHERE id = $1 FOR UPDATE")
            .bind(role_id)
            .fetch_optional(&mut *tx)
            .await?;

        if locked.is_none() {
            return Err(AppError::NotFound(format!("Role '{}'", role_id)));
        }

        let graph = load_graph(&mut tx).await?;

        // 目录键加 FOR KEY SHARE：提交前不会被并发删除，外键插入不会失败
        let catalog: HashSet<PermissionKey> = sqlx::query_scalar::<_, String>(
            "SELECT permission_key FROM permissions FOR KEY SHARE",
        )
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let current = graph.direct_grants(role_id).cloned().unwrap_or_default();
        let plan = update(&GrantContext {
            role_id,
            current: &current,
            graph: &graph,
            catalog: &catalog,
        })?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        let keys: Vec<String> = plan.grants.iter().cloned().collect();
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_key) SELECT $1, UNNEST($2::text[])",
        )
        .bind(role_id)
        .bind(&keys)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(plan)
    }

    async fn get_assignment(&self, user_id: Uuid) -> Result<Option<UserRoleAssignment>> {
        let assignment = sqlx::query_as::<_, UserRoleAssignment>(
            "SELECT user_id, role_id, assigned_at FROM user_roles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(assignment)
    }

    async fn assign_role(&self, user_id: Uuid, role_id: &str) -> Result<UserRoleAssignment> {
        let mut tx = self.db.begin().await?;

        let exists = sqlx::query_scalar::<_, String>("SELECT id FROM roles WHERE id = $1 FOR SHARE")
            .bind(role_id)
            .fetch_optional(&mut *tx)
            .await?;

        if exists.is_none() {
            return Err(AppError::NotFound(format!("Role '{}'", role_id)));
        }

        let assignment = sqlx::query_as::<_, UserRoleAssignment>(
            r#"
            INSERT INTO user_roles (user_id, role_id, assigned_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id) DO UPDATE
            SET role_id = EXCLUDED.role_id,
                assigned_at = EXCLUDED.assigned_at
            RETURNING user_id, role_id, assigned_at
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(assignment)
    }

    async fn remove_assignment(&self, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_assignments(&self) -> Result<Vec<UserRoleAssignment>> {
        let assignments = sqlx::query_as::<_, UserRoleAssignment>(
            "SELECT user_id, role_id, assigned_at FROM user_roles ORDER BY assigned_at, user_id",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(assignments)
    }
}
