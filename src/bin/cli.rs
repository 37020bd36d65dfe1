use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use church_permissions::authz::{
    has_manage_on_admin_modules, AuditActor, BuiltinRoleCatalog, PermissionService, SourceState,
};
use church_permissions::db;
use church_permissions::events::{init_event_bus, start_activity_listener};
use church_permissions::models::rbac::EffectivePermissionsResponse;

#[derive(Parser, Debug)]
#[command(author, version, about = "church permissions maintenance tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show how a user's effective permissions were resolved
    Trace {
        user_id: String,
        /// Print the resolution as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the grant/revoke overlay of one user or of every user
    ClearCustomPermissions {
        #[command(flatten)]
        target: ClearTarget,
    },
    /// Overwrite role overrides with the catalog defaults
    ResetRoles {
        /// Only reset this role (default: every catalog role)
        #[arg(long)]
        role: Option<String>,
        /// Recorded as `updated_by` on the written overrides
        #[arg(long, default_value = "cli")]
        updated_by: String,
    },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct ClearTarget {
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may differ,
    // so fall back to the crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        command => run_permission_command(command).await?,
    }

    Ok(())
}

async fn run_permission_command(command: Commands) -> anyhow::Result<()> {
    let pool = db::init().await?;
    let (event_bus, rx) = init_event_bus();
    let listener = tokio::spawn(start_activity_listener(rx, pool.clone()));

    let service = PermissionService::from_pool(
        pool,
        Arc::new(BuiltinRoleCatalog::new()),
        Some(event_bus),
    );

    let result = match command {
        Commands::Trace { user_id, json } => trace(&service, &user_id, json).await,
        Commands::ClearCustomPermissions { target } => clear(&service, target).await,
        Commands::ResetRoles { role, updated_by } => reset(&service, role, updated_by).await,
        Commands::MigrateRun | Commands::MigrateStatus => Ok(()),
    };

    // Dropping the last sender closes the bus; the listener drains and exits.
    drop(service);
    listener.await.context("activity listener panicked")?;

    result
}

async fn trace(service: &PermissionService, user_id: &str, json: bool) -> anyhow::Result<()> {
    let (user, resolution) = service
        .resolve_user(user_id)
        .await
        .with_context(|| format!("failed to resolve permissions for {user_id}"))?;

    if json {
        let response = EffectivePermissionsResponse::new(&user, resolution);
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let trace = &resolution.trace;
    println!("user:   {}", user.id);
    println!("role:   {}", user.role);
    println!();
    println!("1. user role_permissions   {}", describe_state(&trace.user_role_permissions));
    println!("2. role override           {}", describe_state(&trace.role_override));
    println!("3. catalog defaults        {}", describe_state(&trace.catalog_defaults));
    println!("   base source: {:?}", resolution.base_source);
    println!();

    let custom = user.custom_permissions.clone().unwrap_or_default();
    println!("granted overlay ({}):", trace.granted);
    for grant in &custom.granted {
        println!("  + {:<16} {}", grant.module(), join_actions(grant.actions().iter()));
    }
    println!("revoked overlay ({}):", trace.revoked);
    for revoke in &custom.revoked {
        println!("  - {:<16} {}", revoke.module(), join_actions(revoke.actions().iter()));
    }
    println!();

    println!("effective permissions:");
    if resolution.effective.is_empty() {
        println!("  (none)");
    }
    for (module, actions) in resolution.effective.iter() {
        println!("  {:<18} {}", module, join_actions(actions.iter()));
    }
    println!();
    println!("admin panel visible: {}", has_manage_on_admin_modules(&resolution.effective));

    Ok(())
}

async fn clear(service: &PermissionService, target: ClearTarget) -> anyhow::Result<()> {
    let actor = AuditActor::system("cli");

    if let Some(user_id) = target.user {
        service
            .clear_custom_permissions(&user_id, &actor)
            .await
            .with_context(|| format!("failed to clear custom permissions for {user_id}"))?;
        println!("Cleared custom permissions for {}", user_id);
        return Ok(());
    }

    let cleared = service.clear_all_custom_permissions(&actor).await?;
    println!("Cleared custom permissions for {} user(s)", cleared.len());
    for user_id in cleared {
        println!("  {}", user_id);
    }
    Ok(())
}

async fn reset(service: &PermissionService, role: Option<String>, updated_by: String) -> anyhow::Result<()> {
    let actor = AuditActor::system(updated_by);

    let written = match role {
        Some(role) => vec![service
            .reset_role_to_defaults(&role, &actor)
            .await
            .with_context(|| format!("failed to reset role {role}"))?],
        None => service.reset_all_roles_to_defaults(&actor).await?,
    };

    for role_override in &written {
        println!("Reset {:<14} {} module(s)", role_override.role, role_override.modules.len());
    }
    Ok(())
}

fn describe_state(state: &SourceState) -> String {
    match state {
        SourceState::NotConsulted => "not consulted".to_string(),
        SourceState::Absent => "absent".to_string(),
        SourceState::Empty => "empty (treated as absent)".to_string(),
        SourceState::Selected { grants } => format!("selected ({} grant(s))", grants),
    }
}

fn join_actions<'a, T: std::fmt::Display + 'a>(actions: impl Iterator<Item = &'a T>) -> String {
    actions.map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let db_applied = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?;
    let applied_versions: HashSet<i64> = if db_applied.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when running from the repo root, otherwise the crate-local folder.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
