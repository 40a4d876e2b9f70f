//! 权限目录的 HTTP 处理器

use crate::{
    auth::AuthContext,
    error::AppError,
    middleware::AppState,
    models::{CatalogResponse, CreatePermissionRequest},
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

/// 列出权限目录（按分组）
pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    state.permissions.require_manage(auth_context.user_id).await?;

    let groups = state.permissions.catalog.list_groups().await?;
    let count = groups.iter().map(|g| g.permissions.len()).sum();

    Ok(Json(CatalogResponse { groups, count }))
}

/// 向目录添加权限
pub async fn create_permission(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Json(req): Json<CreatePermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.permissions.require_manage(auth_context.user_id).await?;
    req.validate()?;

    let permission = state
        .permissions
        .catalog
        .add_permission(&req.group, &req.key, &req.label)
        .await?;

    tracing::info!(
        user_id = %auth_context.user_id,
        permission = %permission.key,
        group = %req.group,
        "Permission added by administrator"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "group": req.group,
            "permission": permission
        })),
    ))
}

/// 从目录移除权限，同时从所有角色的授权中移除
pub async fn delete_permission(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.permissions.require_manage(auth_context.user_id).await?;

    let removed_from_roles = state.permissions.catalog.remove_permission(&key).await?;

    tracing::info!(
        user_id = %auth_context.user_id,
        permission = %key,
        removed_from_roles,
        "Permission removed by administrator"
    );

    Ok(Json(json!({
        "key": key,
        "removed_from_roles": removed_from_roles
    })))
}
