use axum::extract::State;
use axum::Json;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::jwt::AuthUser;
use crate::models::rbac::EffectivePermissionsResponse;

/// Effective permissions of the caller
///
/// Only authentication is required; every user may read their own set.
#[utoipa::path(
    get,
    path = "/me/permissions",
    tag = "Permissions",
    responses(
        (status = 200, description = "Caller's effective permissions", body = EffectivePermissionsResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Caller has no user profile"),
        (status = 503, description = "Role override store unavailable"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn my_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<EffectivePermissionsResponse>> {
    let (user, resolution) = state.permissions.resolve_user(&auth.user_id).await?;
    Ok(Json(EffectivePermissionsResponse::new(&user, resolution)))
}
