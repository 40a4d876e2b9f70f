//! 当前用户的权限查询

use crate::{auth::AuthContext, error::AppError, middleware::AppState};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// 当前用户的角色与有效权限
pub async fn my_permissions(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let permissions = state
        .permissions
        .get_user_permissions(auth_context.user_id)
        .await?;

    Ok(Json(permissions))
}

/// 当前用户是否拥有某个权限
pub async fn can(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let granted = state
        .permissions
        .check_permission(auth_context.user_id, &key)
        .await?;

    Ok(Json(json!({
        "permission": key,
        "granted": granted
    })))
}
