use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::AppResult;
use sqlx::query_scalar;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_ok: bool,
    pub db_error: Option<String>,
    /// Number of role override documents currently stored.
    pub role_overrides: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Health check", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let db_check = query_scalar::<_, i64>("SELECT COUNT(*) FROM role_overrides")
        .fetch_one(&state.pool)
        .await;

    match db_check {
        Ok(count) => Ok(Json(HealthResponse {
            status: "ok",
            db_ok: true,
            db_error: None,
            role_overrides: Some(count),
        })),
        Err(e) => {
            tracing::warn!(error = %e, "health check could not reach the database");
            Ok(Json(HealthResponse {
                status: "degraded",
                db_ok: false,
                db_error: Some(e.to_string()),
                role_overrides: None,
            }))
        }
    }
}
