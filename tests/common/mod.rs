//! 测试公共模块
//! 每个测试使用全新的内存存储，互不干扰

#![allow(dead_code)]

use axum::{body::Body, http::Request, response::Response};
use coach_authz::{
    auth::JwtService,
    config::{
        AppConfig, AuthzConfig, DatabaseConfig, LoggingConfig, SecurityConfig, ServerConfig,
    },
    middleware::AppState,
    models::{Permission, PermissionGroup, Role},
    repository::MemoryStore,
    seed,
    services::{GrantEditor, PermissionService},
};
use http_body_util::BodyExt;
use secrecy::Secret;
use std::sync::Arc;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret-key-for-testing-only-min-32-chars";

/// 授权配置（与默认值一致）
pub fn test_authz_config() -> AuthzConfig {
    AuthzConfig::default()
}

/// 创建测试配置
pub fn create_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            graceful_shutdown_timeout_secs: 5,
        },
        database: DatabaseConfig {
            url: None,
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            jwt_secret: Secret::new(JWT_SECRET.to_string()),
            access_token_exp_secs: 300,
        },
        authz: test_authz_config(),
    }
}

/// 场景目录：articles.view / articles.manage / users.view，外加管理类权限
pub fn scenario_catalog() -> Vec<PermissionGroup> {
    vec![
        PermissionGroup::new(
            "Articles",
            vec![
                Permission::new("articles.view", "View articles"),
                Permission::new("articles.manage", "Manage articles"),
            ],
        ),
        PermissionGroup::new(
            "Users",
            vec![
                Permission::new("users.view", "View users"),
                Permission::new("users.manage", "Manage users"),
            ],
        ),
        PermissionGroup::new(
            "Roles & permissions",
            vec![Permission::new("permissions.manage", "Manage permissions")],
        ),
    ]
}

/// 只有目录、没有角色的服务
pub fn create_services() -> Arc<PermissionService> {
    let store = Arc::new(MemoryStore::with_catalog(scenario_catalog()));
    Arc::new(PermissionService::new(store, &test_authz_config()))
}

/// 标准场景：
/// - user: articles.view
/// - editor inherits user: articles.view, articles.manage
/// - admin inherits editor: users.view, users.manage, permissions.manage
pub async fn create_scenario_services() -> Arc<PermissionService> {
    let service = create_services();

    save_role(&service, Role::new("user", "Member"), &["articles.view"]).await;
    save_role(
        &service,
        Role::new("editor", "Editor").inheriting(["user"]),
        &["articles.view", "articles.manage"],
    )
    .await;
    save_role(
        &service,
        Role::new("admin", "Administrator").inheriting(["editor"]),
        &["users.view", "users.manage", "permissions.manage"],
    )
    .await;

    service
}

/// 创建角色并以系统身份设置直接授权
pub async fn save_role(service: &PermissionService, role: Role, grants: &[&str]) {
    let role = service.roles.upsert_role(role).await.unwrap();
    let grants: Vec<String> = grants.iter().map(|k| k.to_string()).collect();
    service
        .engine
        .set_direct_grants(&GrantEditor::System, &role.id, &grants)
        .await
        .unwrap();
}

/// 创建测试应用状态（默认目录与内置角色）
pub async fn create_test_app_state() -> Arc<AppState> {
    let config = create_test_config();
    let store = Arc::new(MemoryStore::new());
    let permissions = Arc::new(PermissionService::new(store, &config.authz));

    seed::bootstrap(&permissions, &config.authz)
        .await
        .expect("Failed to bootstrap authorization data");

    Arc::new(AppState {
        jwt_service: Arc::new(
            JwtService::from_config(&config).expect("Failed to create JWT service"),
        ),
        config: Arc::new(config),
        db: None,
        permissions,
    })
}

/// 为用户签发访问令牌
pub fn token_for(state: &AppState, user_id: Uuid) -> String {
    state
        .jwt_service
        .generate_access_token(&user_id)
        .expect("Failed to generate token")
}

/// 创建一个被分配了指定角色的用户，返回其令牌
pub async fn user_with_role(state: &AppState, role_id: &str) -> (Uuid, String) {
    let user_id = Uuid::new_v4();
    state
        .permissions
        .assignments
        .assign(user_id, role_id)
        .await
        .expect("Failed to assign role");
    (user_id, token_for(state, user_id))
}

/// 构造带认证头的请求
pub fn authed_request(method: &str, uri: &str, token: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token));

    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// 读取 JSON 响应体
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
