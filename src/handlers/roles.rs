//! 角色管理的 HTTP 处理器

use crate::{
    auth::AuthContext,
    error::AppError,
    middleware::AppState,
    models::{RolePermissionsResponse, SetPermissionsRequest, UpsertRoleRequest},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

// ==================== Roles ====================

/// 列出所有角色
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    state.permissions.require_manage(auth_context.user_id).await?;

    let roles = state.permissions.roles.list_roles().await?;

    Ok(Json(json!({
        "roles": roles,
        "count": roles.len()
    })))
}

/// 获取角色详情
pub async fn get_role(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.permissions.require_manage(auth_context.user_id).await?;

    let role = state.permissions.roles.get_role(&id).await?;

    Ok(Json(json!({ "role": role })))
}

/// 创建或替换角色
pub async fn upsert_role(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<UpsertRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.permissions.require_manage(auth_context.user_id).await?;
    req.validate()?;

    let role = state.permissions.roles.upsert_role(req.into_role(&id)).await?;

    tracing::info!(user_id = %auth_context.user_id, role_id = %role.id, "Role saved by administrator");

    Ok(Json(json!({ "role": role })))
}

/// 删除角色
pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.permissions.require_manage(auth_context.user_id).await?;

    state.permissions.roles.delete_role(&id).await?;

    tracing::info!(user_id = %auth_context.user_id, role_id = %id, "Role deleted by administrator");

    Ok(StatusCode::NO_CONTENT)
}

// ==================== Role permissions ====================

/// 角色的直接授权与有效授权
pub async fn get_role_permissions(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.permissions.require_manage(auth_context.user_id).await?;

    // 未知角色返回 404 而不是空集合
    let role = state.permissions.roles.get_role(&id).await?;
    let engine = &state.permissions.engine;
    let direct = engine.direct_grants(&role.id).await?;
    let effective = engine.effective_grants(&role.id).await?;

    Ok(Json(RolePermissionsResponse {
        role_id: role.id,
        direct: direct.into_iter().collect(),
        effective: effective.into_iter().collect(),
    }))
}

/// 整体替换角色的直接授权
pub async fn set_role_permissions(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<SetPermissionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let editor = state.permissions.require_manage(auth_context.user_id).await?;
    req.validate()?;

    let outcome = state
        .permissions
        .engine
        .set_direct_grants(&editor, &id, &req.permissions)
        .await?;

    Ok(Json(outcome))
}
