//! 初始数据
//! 默认权限目录与内置角色；启动时幂等写入，保证系统始终存在管理员角色

use crate::{
    config::AuthzConfig,
    error::Result,
    models::{Permission, PermissionGroup, Role},
    services::{GrantEditor, PermissionService},
};

/// 教练平台的默认权限目录
pub fn default_catalog() -> Vec<PermissionGroup> {
    vec![
        PermissionGroup::new(
            "Articles",
            vec![
                Permission::new("articles.view", "View articles"),
                Permission::new("articles.manage", "Create, edit and publish articles"),
            ],
        ),
        PermissionGroup::new(
            "Recipes",
            vec![
                Permission::new("recipes.view", "View recipes"),
                Permission::new("recipes.manage", "Create and edit recipes"),
            ],
        ),
        PermissionGroup::new(
            "Tips",
            vec![
                Permission::new("tips.view", "View daily tips"),
                Permission::new("tips.manage", "Create and edit tips"),
            ],
        ),
        PermissionGroup::new(
            "Training plans",
            vec![
                Permission::new("plans.view", "View own training plans"),
                Permission::new("plans.manage", "Create and assign training plans"),
            ],
        ),
        PermissionGroup::new(
            "Clients",
            vec![
                Permission::new("clients.view", "View client profiles and progress"),
                Permission::new("clients.manage", "Edit client profiles"),
            ],
        ),
        PermissionGroup::new(
            "Coaching assistant",
            vec![Permission::new("chat.use", "Chat with the coaching assistant")],
        ),
        PermissionGroup::new(
            "Dashboard",
            vec![
                Permission::new("dashboard.view", "View dashboard statistics"),
                Permission::new("reports.export", "Export progress reports"),
            ],
        ),
        PermissionGroup::new(
            "Integrations",
            vec![Permission::new("integrations.manage", "Link and unlink fitness devices")],
        ),
        PermissionGroup::new(
            "Users",
            vec![
                Permission::new("users.view", "View user accounts"),
                Permission::new("users.manage", "Edit accounts and assign roles"),
            ],
        ),
        PermissionGroup::new(
            "Roles & permissions",
            vec![Permission::new("permissions.manage", "Manage roles and permissions")],
        ),
    ]
}

const MANAGE_GROUP: &str = "Roles & permissions";

struct BuiltinRole {
    role: Role,
    grants: Vec<&'static str>,
}

fn builtin_roles(config: &AuthzConfig) -> Vec<BuiltinRole> {
    let fallback = config.fallback_role.as_str();
    let admin = config.admin_role.as_str();
    let reserved = |id: &str| id == fallback || id == admin;

    let mut roles = vec![BuiltinRole {
        role: Role::new(fallback, "Member")
            .with_description("Default role of every signed-up member"),
        grants: vec![
            "articles.view",
            "recipes.view",
            "tips.view",
            "plans.view",
            "chat.use",
            "integrations.manage",
        ],
    }];

    let mut admin_parents = Vec::new();

    if !reserved("coach") {
        roles.push(BuiltinRole {
            role: Role::new("coach", "Coach")
                .with_description("Coaches their clients and builds training plans")
                .inheriting([fallback]),
            grants: vec![
                "plans.manage",
                "clients.view",
                "clients.manage",
                "dashboard.view",
                "reports.export",
            ],
        });
        admin_parents.push("coach");
    }

    if !reserved("editor") {
        roles.push(BuiltinRole {
            role: Role::new("editor", "Editor")
                .with_description("Maintains articles, recipes and tips")
                .inheriting([fallback]),
            grants: vec!["articles.manage", "recipes.manage", "tips.manage"],
        });
        admin_parents.push("editor");
    }

    if admin_parents.is_empty() {
        admin_parents.push(fallback);
    }

    roles.push(BuiltinRole {
        role: Role::new(admin, "Administrator")
            .with_description("Full access")
            .inheriting(admin_parents),
        // 由 bootstrap 授予目录中的全部权限
        grants: Vec::new(),
    });

    roles
}

/// `bootstrap` 实际写入的内容
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub permissions_added: usize,
    pub roles_created: Vec<String>,
    pub manage_permission_restored: bool,
}

/// 写入缺失的目录项与内置角色；已存在的数据不会被覆盖
pub async fn bootstrap(service: &PermissionService, config: &AuthzConfig) -> Result<BootstrapReport> {
    let mut report = BootstrapReport::default();

    // 1. 权限目录
    let existing = service.catalog.all_keys().await?;
    for group in default_catalog() {
        for permission in group.permissions {
            if !existing.contains(&permission.key) {
                service
                    .catalog
                    .add_permission(&group.title, &permission.key, &permission.label)
                    .await?;
                report.permissions_added += 1;
            }
        }
    }

    if !service.catalog.is_valid_key(&config.manage_permission).await? {
        service
            .catalog
            .add_permission(MANAGE_GROUP, &config.manage_permission, "Manage roles and permissions")
            .await?;
        report.permissions_added += 1;
    }

    // 2. 内置角色（父角色在前）
    let all_keys: Vec<String> = service.catalog.all_keys().await?.into_iter().collect();

    for builtin in builtin_roles(config) {
        if service.roles.list_roles().await?.iter().any(|r| r.id == builtin.role.id) {
            continue;
        }

        let role = service.roles.upsert_role(builtin.role).await?;
        let grants: Vec<String> = if role.id == config.admin_role {
            all_keys.clone()
        } else {
            builtin.grants.iter().map(|k| k.to_string()).collect()
        };

        service
            .engine
            .set_direct_grants(&GrantEditor::System, &role.id, &grants)
            .await?;
        report.roles_created.push(role.id);
    }

    // 3. 防止锁死：至少一个角色持有管理权限
    let roles = service.roles.list_roles().await?;
    let mut has_manager = false;
    for role in &roles {
        if service.engine.can(&role.id, &config.manage_permission).await? {
            has_manager = true;
            break;
        }
    }

    if !has_manager {
        let mut grants: Vec<String> = service
            .engine
            .direct_grants(&config.admin_role)
            .await?
            .into_iter()
            .collect();
        grants.push(config.manage_permission.clone());

        service
            .engine
            .set_direct_grants(&GrantEditor::System, &config.admin_role, &grants)
            .await?;
        report.manage_permission_restored = true;

        tracing::warn!(
            role_id = %config.admin_role,
            permission = %config.manage_permission,
            "No role could manage permissions; restored on admin role"
        );
    }

    tracing::info!(
        permissions_added = report.permissions_added,
        roles_created = ?report.roles_created,
        "Authorization data bootstrapped"
    );

    Ok(report)
}
