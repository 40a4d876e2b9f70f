//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

use crate::{handlers, middleware::AppState};

/// 请求体上限（授权管理接口只接收小的 JSON）
const MAX_BODY_BYTES: usize = 64 * 1024;

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    // 需要认证的路由；管理接口在处理器内检查管理权限
    let authenticated_routes = Router::new()
        // 当前用户
        .route("/api/v1/me/permissions", get(handlers::me::my_permissions))
        .route("/api/v1/me/can/{key}", get(handlers::me::can))

        // 权限目录
        .route(
            "/api/v1/permissions",
            get(handlers::permissions::list_permissions)
                .post(handlers::permissions::create_permission),
        )
        .route(
            "/api/v1/permissions/{key}",
            delete(handlers::permissions::delete_permission),
        )

        // 角色
        .route("/api/v1/roles", get(handlers::roles::list_roles))
        .route(
            "/api/v1/roles/{id}",
            get(handlers::roles::get_role)
                .put(handlers::roles::upsert_role)
                .delete(handlers::roles::delete_role),
        )
        .route(
            "/api/v1/roles/{id}/permissions",
            get(handlers::roles::get_role_permissions)
                .put(handlers::roles::set_role_permissions),
        )

        // 用户角色分配
        .route("/api/v1/assignments", get(handlers::assignments::list_assignments))
        .route(
            "/api/v1/users/{id}/role",
            get(handlers::assignments::get_user_role)
                .put(handlers::assignments::assign_user_role)
                .delete(handlers::assignments::unassign_user_role),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.jwt_service.clone(),
            crate::auth::middleware::jwt_auth_middleware,
        ));

    // 组合所有路由
    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(crate::middleware::request_tracking_middleware))
        .with_state(state)
}
