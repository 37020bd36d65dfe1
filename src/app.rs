use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{AuthzMode, BuiltinRoleCatalog, DefaultPolicyEvaluator, PermissionService, PolicyEvaluator};
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{health, me, rbac};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub event_bus: EventBus,
    pub permissions: PermissionService,
    pub authz_mode: AuthzMode,
    pub evaluator: Arc<dyn PolicyEvaluator>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig, event_bus: EventBus) -> Self {
        let permissions = PermissionService::from_pool(
            pool.clone(),
            Arc::new(BuiltinRoleCatalog::new()),
            Some(event_bus.clone()),
        );

        Self {
            pool,
            jwt: Arc::new(config.jwt),
            event_bus,
            permissions,
            authz_mode: config.authz_mode,
            evaluator: Arc::new(DefaultPolicyEvaluator::new()),
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let config = AppConfig::from_env()?;
    create_app_with_config(pool, config).await
}

pub async fn create_app_with_config(pool: SqlitePool, config: AppConfig) -> Result<Router, AppError> {
    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    tracing::info!(authz_mode = ?config.authz_mode, "building router");
    let state = AppState::new(pool, config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/api/health", get(health::health))
        .route("/me/permissions", get(me::my_permissions))
        .nest("/rbac", rbac::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

/// Drains an `axum_server` listener once `signal` resolves. Connections still
/// open after `grace` are closed.
pub fn shutdown_on<F>(handle: axum_server::Handle, signal: F, grace: Duration) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        signal.await;
        tracing::info!(grace_secs = grace.as_secs(), "draining connections");
        handle.graceful_shutdown(Some(grace));
    })
}
