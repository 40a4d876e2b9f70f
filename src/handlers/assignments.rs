//! 用户角色分配的 HTTP 处理器

use crate::{
    auth::AuthContext,
    error::AppError,
    middleware::AppState,
    models::{AssignRoleRequest, UserRoleResponse},
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// 列出所有显式分配
pub async fn list_assignments(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    state.permissions.require_manage(auth_context.user_id).await?;

    let assignments = state.permissions.assignments.list().await?;

    Ok(Json(json!({
        "assignments": assignments,
        "count": assignments.len(),
        "fallback_role": state.permissions.assignments.fallback_role()
    })))
}

/// 获取用户当前角色
pub async fn get_user_role(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.permissions.require_manage(auth_context.user_id).await?;

    let (role_id, assigned) = state.permissions.assignments.resolve(user_id).await?;

    Ok(Json(UserRoleResponse {
        user_id,
        role_id,
        assigned,
    }))
}

/// 为用户分配角色
pub async fn assign_user_role(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AssignRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.permissions.require_manage(auth_context.user_id).await?;
    req.validate()?;

    let assignment = state
        .permissions
        .assignments
        .assign(user_id, &req.role_id)
        .await?;

    tracing::info!(
        user_id = %auth_context.user_id,
        target_user_id = %user_id,
        role_id = %assignment.role_id,
        "Role assigned by administrator"
    );

    Ok(Json(json!({ "assignment": assignment })))
}

/// 撤销分配，用户回落到默认角色
pub async fn unassign_user_role(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.permissions.require_manage(auth_context.user_id).await?;

    let removed = state.permissions.assignments.unassign(user_id).await?;

    Ok(Json(json!({
        "user_id": user_id,
        "removed": removed,
        "role_id": state.permissions.assignments.fallback_role()
    })))
}
