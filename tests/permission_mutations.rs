use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};

use church_permissions::authz::{
    has_manage_on_admin_modules, Action, AuditActor, BuiltinRoleCatalog, GrantInput, PermissionService,
    RoleCatalog,
};
use church_permissions::db::{RoleOverrideRepository, UserRepository};
use church_permissions::errors::AppError;
use church_permissions::models::user::UserRecord;

async fn setup() -> Result<(TempDir, SqlitePool, PermissionService)> {
    let dir = tempdir()?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    let service = PermissionService::from_pool(pool.clone(), Arc::new(BuiltinRoleCatalog::new()), None);
    Ok((dir, pool, service))
}

fn actions(list: &[&str]) -> Vec<String> {
    list.iter().map(|a| a.to_string()).collect()
}

async fn raw_custom_permissions(pool: &SqlitePool, id: &str) -> Result<Option<String>> {
    Ok(sqlx::query_scalar("SELECT custom_permissions FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?)
}

#[tokio::test]
async fn grants_merge_by_module() -> Result<()> {
    let (_dir, pool, service) = setup().await?;
    UserRepository::new(pool).upsert(&UserRecord::new("u1", "member")).await?;
    let actor = AuditActor::system("test");

    service.grant_to_user("u1", "finance", &actions(&["view"]), &actor).await?;
    let user = service.grant_to_user("u1", "finance", &actions(&["update"]), &actor).await?;

    let custom = user.custom_permissions.expect("overlay written");
    assert_eq!(custom.granted.len(), 1);
    assert!(custom.granted[0].contains(Action::View));
    assert!(custom.granted[0].contains(Action::Update));

    let (_, resolution) = service.resolve_user("u1").await?;
    assert!(resolution.effective.can("finance", Action::Update));
    Ok(())
}

#[tokio::test]
async fn revoke_wins_over_grant_and_catalog() -> Result<()> {
    let (_dir, pool, service) = setup().await?;
    UserRepository::new(pool).upsert(&UserRecord::new("u1", "member")).await?;
    let actor = AuditActor::system("test");

    service.grant_to_user("u1", "forum", &actions(&["manage"]), &actor).await?;
    service.revoke_from_user("u1", "forum", &actions(&["manage", "create"]), &actor).await?;
    // Revoking something never held is harmless.
    service.revoke_from_user("u1", "finance", &actions(&["delete"]), &actor).await?;

    let (_, resolution) = service.resolve_user("u1").await?;
    let forum = resolution.effective.actions("forum").expect("forum view remains");
    assert_eq!(forum.iter().copied().collect::<Vec<_>>(), vec![Action::View]);
    assert!(!resolution.effective.contains_module("finance"));
    Ok(())
}

#[tokio::test]
async fn invalid_grant_is_rejected_before_writing() -> Result<()> {
    let (_dir, pool, service) = setup().await?;
    UserRepository::new(pool.clone()).upsert(&UserRecord::new("u1", "member")).await?;
    let actor = AuditActor::system("test");

    let err = service
        .grant_to_user("u1", "finance", &actions(&["view", "approve"]), &actor)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidGrant(_)));
    assert_eq!(raw_custom_permissions(&pool, "u1").await?, None);

    let err = service
        .set_role_override(
            "leader",
            vec![GrantInput::new("events", &["view"]), GrantInput::new("  ", &["view"])],
            &actor,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidGrant(_)));
    assert!(RoleOverrideRepository::new(pool).find("leader").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn clearing_custom_permissions_removes_the_column() -> Result<()> {
    let (_dir, pool, service) = setup().await?;
    UserRepository::new(pool.clone()).upsert(&UserRecord::new("u1", "member")).await?;
    let actor = AuditActor::system("test");

    service.grant_to_user("u1", "finance", &actions(&["view"]), &actor).await?;
    assert!(raw_custom_permissions(&pool, "u1").await?.is_some());

    let user = service.clear_custom_permissions("u1", &actor).await?;
    assert!(user.custom_permissions.is_none());
    assert_eq!(raw_custom_permissions(&pool, "u1").await?, None);

    let err = service.clear_custom_permissions("ghost", &actor).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn clear_all_reports_only_users_with_an_overlay() -> Result<()> {
    let (_dir, pool, service) = setup().await?;
    let users = UserRepository::new(pool);
    users.upsert(&UserRecord::new("a", "member")).await?;
    users.upsert(&UserRecord::new("b", "member")).await?;
    users.upsert(&UserRecord::new("c", "leader")).await?;
    let actor = AuditActor::system("test");

    service.grant_to_user("a", "finance", &actions(&["view"]), &actor).await?;
    service.revoke_from_user("c", "events", &actions(&["update"]), &actor).await?;

    let mut cleared = service.clear_all_custom_permissions(&actor).await?;
    cleared.sort();
    assert_eq!(cleared, vec!["a".to_string(), "c".to_string()]);

    for user in users.list().await? {
        assert!(user.custom_permissions.is_none(), "{} still has an overlay", user.id);
    }
    Ok(())
}

#[tokio::test]
async fn reset_role_writes_catalog_defaults_as_override() -> Result<()> {
    let (_dir, pool, service) = setup().await?;
    let actor = AuditActor::system("ops");

    service
        .set_role_override("member", vec![GrantInput::new("finance", &["manage"])], &actor)
        .await?;
    let reset = service.reset_role_to_defaults("member", &actor).await?;

    let catalog = BuiltinRoleCatalog::new();
    assert_eq!(reset.modules, catalog.default_grants("member"));
    assert_eq!(reset.updated_by, "ops");

    let stored = RoleOverrideRepository::new(pool).find("member").await?.expect("override stored");
    assert_eq!(stored.modules, reset.modules);
    Ok(())
}

#[tokio::test]
async fn reset_all_roles_covers_every_catalog_role() -> Result<()> {
    let (_dir, pool, service) = setup().await?;
    let written = service.reset_all_roles_to_defaults(&AuditActor::system("cli")).await?;

    let catalog = BuiltinRoleCatalog::new();
    assert_eq!(written.len(), catalog.known_roles().len());
    assert_eq!(RoleOverrideRepository::new(pool).list().await?.len(), written.len());
    Ok(())
}

#[tokio::test]
async fn role_permissions_can_be_set_and_removed() -> Result<()> {
    let (_dir, pool, service) = setup().await?;
    UserRepository::new(pool).upsert(&UserRecord::new("u1", "finance")).await?;
    let actor = AuditActor::system("test");

    let user = service
        .set_user_role_permissions("u1", Some(vec![GrantInput::new("events", &["view"])]), &actor)
        .await?;
    assert_eq!(user.role_permissions.as_ref().map(Vec::len), Some(1));
    assert!(!service.resolve_user("u1").await?.1.effective.contains_module("finance"));

    let user = service.set_user_role_permissions("u1", None, &actor).await?;
    assert!(user.role_permissions.is_none());
    assert!(service.resolve_user("u1").await?.1.effective.can("finance", Action::Manage));
    Ok(())
}

#[tokio::test]
async fn assign_role_changes_resolution_and_rejects_blank_role() -> Result<()> {
    let (_dir, pool, service) = setup().await?;
    UserRepository::new(pool).upsert(&UserRecord::new("u1", "member")).await?;
    let actor = AuditActor::system("test");

    service.assign_role("u1", "secretary", &actor).await?;
    assert!(service.resolve_user("u1").await?.1.effective.can("members", Action::Manage));

    let err = service.assign_role("u1", "   ", &actor).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_grants_all_succeed() -> Result<()> {
    let (_dir, pool, service) = setup().await?;
    let users = UserRepository::new(pool);
    for i in 0..16 {
        users.upsert(&UserRecord::new(format!("u{i}"), "member")).await?;
    }

    let mut tasks = Vec::new();
    for i in 0..16 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            let actor = AuditActor::system("test");
            service.grant_to_user(&format!("u{i}"), "finance", &actions(&["view"]), &actor).await
        }));
    }
    // Same user, different modules: every write must survive.
    for module in ["members", "events", "blog", "assistance"] {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            let actor = AuditActor::system("test");
            service.grant_to_user("u0", module, &actions(&["update"]), &actor).await
        }));
    }

    for task in tasks {
        let result = task.await?;
        assert!(result.is_ok(), "concurrent grant failed: {:?}", result.err());
    }

    for i in 0..16 {
        let (_, resolution) = service.resolve_user(&format!("u{i}")).await?;
        assert!(resolution.effective.can("finance", Action::View), "u{i} lost its grant");
    }
    let (_, resolution) = service.resolve_user("u0").await?;
    for module in ["members", "events", "blog", "assistance"] {
        assert!(resolution.effective.can(module, Action::Update), "u0 lost {module}");
    }
    Ok(())
}

#[tokio::test]
async fn manage_on_admin_module_toggles_admin_panel() -> Result<()> {
    let (_dir, pool, service) = setup().await?;
    UserRepository::new(pool).upsert(&UserRecord::new("u1", "member")).await?;
    let actor = AuditActor::system("test");

    let (_, before) = service.resolve_user("u1").await?;
    assert!(!has_manage_on_admin_modules(&before.effective));
    assert!(!service.admin_panel_visible("u1").await?);

    service.grant_to_user("u1", "members", &actions(&["manage"]), &actor).await?;
    let (_, granted) = service.resolve_user("u1").await?;
    assert!(has_manage_on_admin_modules(&granted.effective));
    assert!(service.admin_panel_visible("u1").await?);

    service.revoke_from_user("u1", "members", &actions(&["manage"]), &actor).await?;
    let (_, revoked) = service.resolve_user("u1").await?;
    assert!(!has_manage_on_admin_modules(&revoked.effective));
    assert!(!service.admin_panel_visible("u1").await?);
    Ok(())
}

#[tokio::test]
async fn grant_after_revoke_is_stored_but_stays_ineffective() -> Result<()> {
    let (_dir, pool, service) = setup().await?;
    UserRepository::new(pool).upsert(&UserRecord::new("u1", "member")).await?;
    let actor = AuditActor::system("test");

    service.revoke_from_user("u1", "finance", &actions(&["view"]), &actor).await?;
    let user = service.grant_to_user("u1", "finance", &actions(&["view"]), &actor).await?;

    let custom = user.custom_permissions.expect("overlay written");
    assert!(custom.granted[0].contains(Action::View));
    assert!(custom.revoke_cancels(&custom.granted[0]));

    let (_, resolution) = service.resolve_user("u1").await?;
    assert!(!resolution.effective.contains_module("finance"));

    // Clearing the overlay is the way back; the grant alone never lifts a revoke.
    service.clear_custom_permissions("u1", &actor).await?;
    service.grant_to_user("u1", "finance", &actions(&["view"]), &actor).await?;
    let (_, resolution) = service.resolve_user("u1").await?;
    assert!(resolution.effective.can("finance", Action::View));
    Ok(())
}
