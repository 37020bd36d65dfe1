use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tower::ServiceExt; // for `oneshot`
use tempfile::tempdir;

use church_permissions::config::AppConfig;
use church_permissions::create_app_with_config;
use church_permissions::db::UserRepository;
use church_permissions::jwt::JwtConfig;
use church_permissions::models::user::UserRecord;

#[tokio::test]
async fn test_activity_log_flow() -> Result<()> {
    // 1. Setup DB and App
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    // Run migrations
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    UserRepository::new(pool.clone())
        .upsert(&UserRecord::new("member-1", "member"))
        .await?;

    let jwt = JwtConfig::new("test-secret");
    let token = jwt.encode("admin-1")?;
    let app = create_app_with_config(pool.clone(), AppConfig::new(jwt)).await?;

    // 2. Grant, then reset a role
    let req = Request::builder()
        .method("POST")
        .uri("/rbac/users/member-1/permissions/grant")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token))
        .header("user-agent", "audit-test")
        .body(Body::from(json!({ "module": "finance", "actions": ["view"] }).to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder()
        .method("POST")
        .uri("/rbac/roles/leader/reset")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // 3. The listener persists asynchronously; the event store row is written last
    for _ in 0..50 {
        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event_store")
            .fetch_one(&pool)
            .await?;
        if stored >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let rows = sqlx::query("SELECT event_name, actor_id, subject_id, severity, properties FROM activity_log ORDER BY occurred_at")
        .fetch_all(&pool)
        .await?;
    assert_eq!(rows.len(), 2, "expected two activity rows");

    let names: Vec<String> = rows.iter().map(|r| r.get("event_name")).collect();
    assert!(names.contains(&"user_permissions.granted".to_string()), "{:?}", names);
    assert!(names.contains(&"role_override.reset".to_string()), "{:?}", names);

    for row in &rows {
        assert_eq!(row.get::<String, _>("actor_id"), "admin-1");
        assert_eq!(row.get::<String, _>("severity"), "critical");
    }

    let grant_row = rows
        .iter()
        .find(|r| r.get::<String, _>("event_name") == "user_permissions.granted")
        .context("grant row")?;
    assert_eq!(grant_row.get::<String, _>("subject_id"), "member-1");
    let properties: serde_json::Value = serde_json::from_str(&grant_row.get::<String, _>("properties"))?;
    assert_eq!(properties["payload"]["context"]["user_agent"], "audit-test");
    assert!(properties["payload"]["old"]["custom_permissions"].is_null());

    // 4. Event store forms a hash chain
    let chain = sqlx::query("SELECT payload, prev_hash, hash FROM event_store ORDER BY rowid")
        .fetch_all(&pool)
        .await?;
    assert_eq!(chain.len(), 2);

    let mut prev: Option<String> = None;
    for link in &chain {
        let stored_prev: Option<String> = link.get("prev_hash");
        assert_eq!(stored_prev, prev);

        let mut hasher = Sha256::new();
        if let Some(ref p) = prev {
            hasher.update(p.as_bytes());
        }
        hasher.update(link.get::<String, _>("payload").as_bytes());
        let expected = hex::encode(hasher.finalize());
        assert_eq!(link.get::<String, _>("hash"), expected);
        prev = Some(expected);
    }

    Ok(())
}
