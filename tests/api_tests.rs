//! HTTP API 集成测试

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

mod common;
use common::{authed_request, body_json, create_test_app_state, token_for, user_with_role};

#[tokio::test]
async fn test_health_endpoint() {
    let state = create_test_app_state().await;
    let app = coach_authz::routes::create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_endpoint() {
    let state = create_test_app_state().await;
    let app = coach_authz::routes::create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["ready"], true);
    assert!(json["checks"].is_array());
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let state = create_test_app_state().await;
    let app = coach_authz::routes::create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/me/permissions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], 401);
}

#[tokio::test]
async fn test_invalid_token_is_unauthorized() {
    let state = create_test_app_state().await;
    let app = coach_authz::routes::create_router(state);

    let response = app
        .oneshot(authed_request("GET", "/api/v1/roles", "not-a-jwt", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_my_permissions_for_unassigned_user() {
    let state = create_test_app_state().await;
    let token = token_for(&state, Uuid::new_v4());
    let app = coach_authz::routes::create_router(state);

    let response = app
        .oneshot(authed_request("GET", "/api/v1/me/permissions", &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["role_id"], "user");
    assert_eq!(json["assigned"], false);

    let permissions = json["permissions"].as_array().unwrap();
    assert!(permissions.contains(&json!("articles.view")));
    assert!(!permissions.contains(&json!("permissions.manage")));
}

#[tokio::test]
async fn test_can_endpoint() {
    let state = create_test_app_state().await;
    let (_, token) = user_with_role(&state, "editor").await;
    let app = coach_authz::routes::create_router(state);

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/api/v1/me/can/articles.manage", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["granted"], true);

    let response = app
        .oneshot(authed_request("GET", "/api/v1/me/can/users.manage", &token, None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["granted"], false);
}

#[tokio::test]
async fn test_admin_endpoints_forbidden_without_manage_permission() {
    let state = create_test_app_state().await;
    let (_, token) = user_with_role(&state, "editor").await;
    let app = coach_authz::routes::create_router(state);

    for (method, uri) in [
        ("GET", "/api/v1/permissions"),
        ("GET", "/api/v1/roles"),
        ("GET", "/api/v1/roles/admin/permissions"),
        ("GET", "/api/v1/assignments"),
        ("DELETE", "/api/v1/roles/coach"),
    ] {
        let response = app
            .clone()
            .oneshot(authed_request(method, uri, &token, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{} {}", method, uri);
    }
}

#[tokio::test]
async fn test_admin_lists_catalog_and_roles() {
    let state = create_test_app_state().await;
    let (_, token) = user_with_role(&state, "admin").await;
    let app = coach_authz::routes::create_router(state);

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/api/v1/permissions", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["groups"][0]["title"], "Articles");
    assert!(json["count"].as_u64().unwrap() > 0);

    let response = app
        .oneshot(authed_request("GET", "/api/v1/roles", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["count"], 4);
}

#[tokio::test]
async fn test_role_lifecycle_through_api() {
    let state = create_test_app_state().await;
    let (_, token) = user_with_role(&state, "admin").await;
    let app = coach_authz::routes::create_router(state);

    // 创建角色
    let response = app
        .clone()
        .oneshot(authed_request(
            "PUT",
            "/api/v1/roles/nutritionist",
            &token,
            Some(json!({
                "name": "Nutritionist",
                "description": "Maintains recipes",
                "inherits": ["user"]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["role"]["id"], "nutritionist");

    // 设置直接授权，未知键被丢弃
    let response = app
        .clone()
        .oneshot(authed_request(
            "PUT",
            "/api/v1/roles/nutritionist/permissions",
            &token,
            Some(json!({ "permissions": ["recipes.manage", "bogus.key", "recipes.manage"] })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["permissions"], json!(["recipes.manage"]));
    assert_eq!(json["dropped_unknown"], json!(["bogus.key"]));

    // 有效授权包含继承自 user 的权限
    let response = app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/api/v1/roles/nutritionist/permissions",
            &token,
            None,
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["direct"], json!(["recipes.manage"]));
    let effective = json["effective"].as_array().unwrap();
    assert!(effective.contains(&json!("recipes.manage")));
    assert!(effective.contains(&json!("articles.view")));

    // 删除
    let response = app
        .clone()
        .oneshot(authed_request("DELETE", "/api/v1/roles/nutritionist", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(authed_request("GET", "/api/v1/roles/nutritionist", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cycle_is_rejected_through_api() {
    let state = create_test_app_state().await;
    let (_, token) = user_with_role(&state, "admin").await;
    let app = coach_authz::routes::create_router(state);

    // admin 继承 editor；让 editor 继承 admin 会形成环
    let response = app
        .oneshot(authed_request(
            "PUT",
            "/api/v1/roles/editor",
            &token,
            Some(json!({ "name": "Editor", "inherits": ["admin"] })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], 400);
}

#[tokio::test]
async fn test_unknown_request_fields_rejected() {
    let state = create_test_app_state().await;
    let (_, token) = user_with_role(&state, "admin").await;
    let app = coach_authz::routes::create_router(state);

    let response = app
        .oneshot(authed_request(
            "PUT",
            "/api/v1/roles/coach",
            &token,
            Some(json!({ "name": "Coach", "is_admin": true })),
        ))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_delete_inherited_role_conflicts() {
    let state = create_test_app_state().await;
    let (_, token) = user_with_role(&state, "admin").await;
    let app = coach_authz::routes::create_router(state);

    let response = app
        .oneshot(authed_request("DELETE", "/api/v1/roles/editor", &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_user_role_assignment_through_api() {
    let state = create_test_app_state().await;
    let (_, token) = user_with_role(&state, "admin").await;
    let target = Uuid::new_v4();
    let app = coach_authz::routes::create_router(state);

    let uri = format!("/api/v1/users/{}/role", target);

    let response = app
        .clone()
        .oneshot(authed_request("GET", &uri, &token, None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["role_id"], "user");
    assert_eq!(json["assigned"], false);

    let response = app
        .clone()
        .oneshot(authed_request("PUT", &uri, &token, Some(json!({ "role_id": "coach" }))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(authed_request("PUT", &uri, &token, Some(json!({ "role_id": "ghost" }))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(authed_request("GET", &uri, &token, None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["role_id"], "coach");
    assert_eq!(json["assigned"], true);

    let response = app
        .oneshot(authed_request("DELETE", &uri, &token, None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["removed"], true);
    assert_eq!(json["role_id"], "user");
}

#[tokio::test]
async fn test_catalog_mutation_through_api() {
    let state = create_test_app_state().await;
    let (_, token) = user_with_role(&state, "admin").await;
    let app = coach_authz::routes::create_router(state);

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/permissions",
            &token,
            Some(json!({ "group": "Recipes", "key": "recipes.export", "label": "Export recipes" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/permissions",
            &token,
            Some(json!({ "group": "Recipes", "key": "recipes.export", "label": "Again" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(authed_request(
            "DELETE",
            "/api/v1/permissions/recipes.export",
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["key"], "recipes.export");
}

/// 非白名单管理者不能修改关键权限，其余改动照常生效
#[tokio::test]
async fn test_critical_permission_partial_rejection_through_api() {
    let state = create_test_app_state().await;
    state
        .permissions
        .roles
        .upsert_role(coach_authz::models::Role::new("manager", "Manager"))
        .await
        .unwrap();
    state
        .permissions
        .engine
        .set_direct_grants(
            &coach_authz::services::GrantEditor::System,
            "manager",
            &["permissions.manage".to_string()],
        )
        .await
        .unwrap();
    let (_, token) = user_with_role(&state, "manager").await;
    let app = coach_authz::routes::create_router(state);

    let response = app
        .oneshot(authed_request(
            "PUT",
            "/api/v1/roles/coach/permissions",
            &token,
            Some(json!({ "permissions": ["plans.manage", "users.manage"] })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["permissions"], json!(["plans.manage"]));
    assert_eq!(json["rejected_critical"], json!(["users.manage"]));
}

#[tokio::test]
async fn test_admin_cannot_lock_everyone_out() {
    let state = create_test_app_state().await;
    let (_, token) = user_with_role(&state, "admin").await;
    let app = coach_authz::routes::create_router(state);

    let response = app
        .clone()
        .oneshot(authed_request(
            "PUT",
            "/api/v1/roles/admin/permissions",
            &token,
            Some(json!({ "permissions": [] })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["permissions"], json!(["permissions.manage"]));
    assert_eq!(json["retained"], json!(["permissions.manage"]));

    // 管理接口仍然可用
    let response = app
        .oneshot(authed_request("GET", "/api/v1/roles", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_delete_fallback_role_through_api_conflicts() {
    let state = create_test_app_state().await;
    let (_, token) = user_with_role(&state, "admin").await;
    let app = coach_authz::routes::create_router(state);

    let response = app
        .oneshot(authed_request("DELETE", "/api/v1/roles/user", &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("fallback"));
}
