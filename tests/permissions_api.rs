use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt; // for `oneshot`

use church_permissions::authz::AuthzMode;
use church_permissions::config::AppConfig;
use church_permissions::create_app_with_config;
use church_permissions::db::UserRepository;
use church_permissions::jwt::JwtConfig;
use church_permissions::models::user::UserRecord;

const SECRET: &str = "test-secret";

async fn setup(mode: AuthzMode) -> Result<(TempDir, SqlitePool, Router)> {
    let dir = tempdir()?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    let users = UserRepository::new(pool.clone());
    users.upsert(&UserRecord::new("admin-1", "admin").with_email("admin@church.test")).await?;
    users.upsert(&UserRecord::new("member-1", "member").with_display_name("Maria")).await?;
    users.upsert(&UserRecord::new("pro-1", "professional")).await?;

    let config = AppConfig::new(JwtConfig::new(SECRET)).with_authz_mode(mode);
    let app = create_app_with_config(pool.clone(), config).await?;
    Ok((dir, pool, app))
}

fn token(user_id: &str) -> String {
    JwtConfig::new(SECRET).encode(user_id).expect("token")
}

async fn send(app: &Router, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("authorization", format!("Bearer {}", token(user)));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
    Ok((status, value))
}

#[tokio::test]
async fn own_permissions_require_a_token() -> Result<()> {
    let (_dir, _pool, app) = setup(AuthzMode::Strict).await?;

    let (status, body) = send(&app, "GET", "/me/permissions", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, body) = send(&app, "GET", "/me/permissions", Some("member-1"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "member");
    assert_eq!(body["base_source"], "catalog_defaults");
    assert_eq!(body["admin_panel"], false);
    assert_eq!(body["permissions"]["forum"], json!(["view", "create"]));
    assert_eq!(body["trace"]["role_override"]["state"], "absent");
    Ok(())
}

#[tokio::test]
async fn strict_mode_blocks_mutations_without_manage() -> Result<()> {
    let (_dir, _pool, app) = setup(AuthzMode::Strict).await?;

    let grant = json!({ "module": "finance", "actions": ["view"] });
    let (status, body) = send(&app, "POST", "/rbac/users/member-1/permissions/grant", Some("member-1"), Some(grant.clone())).await?;
    assert_eq!(status, StatusCode::FORBIDDEN, "{}", body);

    let (status, _) = send(&app, "GET", "/rbac/users/admin-1/effective-permissions", Some("member-1"), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Reading yourself is always allowed.
    let (status, _) = send(&app, "GET", "/rbac/users/member-1/effective-permissions", Some("member-1"), None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/rbac/users/member-1/permissions/grant", Some("admin-1"), Some(grant)).await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["custom_permissions"]["granted"][0]["module"], "finance");
    Ok(())
}

#[tokio::test]
async fn advisory_mode_lets_denied_requests_through() -> Result<()> {
    let (_dir, _pool, app) = setup(AuthzMode::Advisory).await?;

    let (status, _) = send(&app, "POST", "/rbac/roles/member/reset", Some("member-1"), None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn unknown_action_is_an_invalid_grant() -> Result<()> {
    let (_dir, _pool, app) = setup(AuthzMode::Strict).await?;

    let body = json!({ "module": "finance", "actions": ["view", "approve"] });
    let (status, resp) = send(&app, "POST", "/rbac/users/member-1/permissions/grant", Some("admin-1"), Some(body)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["error"], "invalid_grant");

    let body = json!({ "modules": [{ "module": "events", "actions": ["approve"] }] });
    let (status, resp) = send(&app, "PUT", "/rbac/roles/leader/override", Some("admin-1"), Some(body)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["error"], "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn role_override_round_trip_changes_admin_panel() -> Result<()> {
    let (_dir, _pool, app) = setup(AuthzMode::Strict).await?;

    let (_, body) = send(&app, "GET", "/rbac/users/pro-1/admin-panel", Some("admin-1"), None).await?;
    assert_eq!(body["visible"], false);

    let body = json!({ "modules": [{ "module": "assistance", "actions": ["view", "create", "update", "manage"] }] });
    let (status, stored) = send(&app, "PUT", "/rbac/roles/professional/override", Some("admin-1"), Some(body)).await?;
    assert_eq!(status, StatusCode::OK, "{}", stored);
    assert_eq!(stored["updated_by"], "admin-1");

    let (_, body) = send(&app, "GET", "/rbac/users/pro-1/admin-panel", Some("admin-1"), None).await?;
    assert_eq!(body["visible"], true);

    let (_, details) = send(&app, "GET", "/rbac/roles/professional", Some("pro-1"), None).await?;
    assert_eq!(details["builtin"], true);
    assert_eq!(details["active"][0]["module"], "assistance");

    let (status, _) = send(&app, "DELETE", "/rbac/roles/professional/override", Some("admin-1"), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", "/rbac/roles/professional/override", Some("admin-1"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, "GET", "/rbac/users/pro-1/effective-permissions", Some("admin-1"), None).await?;
    assert_eq!(body["base_source"], "catalog_defaults");
    Ok(())
}

#[tokio::test]
async fn clearing_custom_permissions_over_http_nulls_the_column() -> Result<()> {
    let (_dir, pool, app) = setup(AuthzMode::Strict).await?;

    let body = json!({ "module": "forum", "actions": ["view"] });
    send(&app, "POST", "/rbac/users/member-1/permissions/revoke", Some("admin-1"), Some(body)).await?;

    let (_, me) = send(&app, "GET", "/me/permissions", Some("member-1"), None).await?;
    assert_eq!(me["permissions"]["forum"], json!(["create"]));

    let (status, body) = send(&app, "DELETE", "/rbac/users/member-1/custom-permissions", Some("admin-1"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["custom_permissions"].is_null());

    let raw: Option<String> = sqlx::query_scalar("SELECT custom_permissions FROM users WHERE id = 'member-1'")
        .fetch_one(&pool)
        .await?;
    assert_eq!(raw, None);
    Ok(())
}

#[tokio::test]
async fn role_permissions_endpoint_sets_and_clears() -> Result<()> {
    let (_dir, _pool, app) = setup(AuthzMode::Strict).await?;

    let body = json!({ "modules": [{ "module": "members", "actions": ["view"] }] });
    let (status, _) = send(&app, "PUT", "/rbac/users/member-1/role-permissions", Some("admin-1"), Some(body)).await?;
    assert_eq!(status, StatusCode::OK);

    let (_, me) = send(&app, "GET", "/me/permissions", Some("member-1"), None).await?;
    assert_eq!(me["base_source"], "user_role_permissions");
    assert_eq!(me["permissions"], json!({ "members": ["view"] }));

    let (status, _) = send(&app, "PUT", "/rbac/users/member-1/role-permissions", Some("admin-1"), Some(json!({ "modules": null }))).await?;
    assert_eq!(status, StatusCode::OK);

    let (_, me) = send(&app, "GET", "/me/permissions", Some("member-1"), None).await?;
    assert_eq!(me["base_source"], "catalog_defaults");
    Ok(())
}

#[tokio::test]
async fn unknown_user_is_not_found() -> Result<()> {
    let (_dir, _pool, app) = setup(AuthzMode::Strict).await?;

    let (status, body) = send(&app, "GET", "/rbac/users/ghost/effective-permissions", Some("admin-1"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    Ok(())
}
