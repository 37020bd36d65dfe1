//! RBAC Admin API Routes
//!
//! Role override maintenance and per-user permission overlays.
//! Every mutation is recorded in the activity log with Critical severity.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};

use crate::app::AppState;
use crate::authz::{modules, Action, AuditActor, RoleDetails, RoleSummary};
use crate::errors::AppError;
use crate::events::RequestContext;
use crate::jwt::AuthUser;
use crate::models::rbac::*;
use crate::models::role_override::RoleOverride;
use crate::routes::require_permission;

// =============================================================================
// ROUTER
// =============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        // Roles
        .route("/roles", get(list_roles))
        .route("/roles/:role", get(get_role))
        .route("/roles/:role/override", put(set_role_override).delete(delete_role_override))
        .route("/roles/:role/reset", post(reset_role))
        // Users
        .route("/users/:user_id/effective-permissions", get(get_effective_permissions))
        .route("/users/:user_id/admin-panel", get(get_admin_panel))
        .route("/users/:user_id/role", put(assign_role))
        .route("/users/:user_id/role-permissions", put(set_role_permissions))
        .route("/users/:user_id/permissions/grant", post(grant_permissions))
        .route("/users/:user_id/permissions/revoke", post(revoke_permissions))
        .route(
            "/users/:user_id/custom-permissions",
            axum::routing::delete(clear_custom_permissions),
        )
}

fn actor(auth: &AuthUser, headers: &HeaderMap) -> AuditActor {
    AuditActor::user(auth.user_id.clone(), Some(RequestContext::from_headers(headers)))
}

/// Reading someone else's permissions needs `users:view`.
async fn guard_user_read(state: &AppState, auth: &AuthUser, user_id: &str) -> Result<(), AppError> {
    if auth.user_id == user_id {
        return Ok(());
    }
    require_permission(state, auth, modules::USERS, Action::View).await
}

// =============================================================================
// ROLE ENDPOINTS
// =============================================================================

/// List catalog roles and custom roles that have an override
#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    responses(
        (status = 200, description = "Known roles", body = Vec<RoleSummary>),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<RoleSummary>>, AppError> {
    Ok(Json(state.permissions.list_roles().await?))
}

/// Catalog defaults, stored override and active grants of a role
#[utoipa::path(
    get,
    path = "/rbac/roles/{role}",
    tag = "RBAC",
    params(
        ("role" = String, Path, description = "Role name"),
    ),
    responses(
        (status = 200, description = "Role details", body = RoleDetails),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(role): Path<String>,
) -> Result<Json<RoleDetails>, AppError> {
    Ok(Json(state.permissions.role_details(&role).await?))
}

/// Replace the override for a role
#[utoipa::path(
    put,
    path = "/rbac/roles/{role}/override",
    tag = "RBAC",
    params(
        ("role" = String, Path, description = "Role name"),
    ),
    request_body = SetRoleOverrideRequest,
    responses(
        (status = 200, description = "Override stored", body = RoleOverride),
        (status = 400, description = "Malformed grant"),
        (status = 403, description = "Missing settings:manage"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_role_override(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role): Path<String>,
    Json(req): Json<SetRoleOverrideRequest>,
) -> Result<Json<RoleOverride>, AppError> {
    require_permission(&state, &auth, modules::SETTINGS, Action::Manage).await?;

    let stored = state
        .permissions
        .set_role_override(&role, req.modules, &actor(&auth, &headers))
        .await?;

    Ok(Json(stored))
}

/// Delete the override so the role falls back to catalog defaults
#[utoipa::path(
    delete,
    path = "/rbac/roles/{role}/override",
    tag = "RBAC",
    params(
        ("role" = String, Path, description = "Role name"),
    ),
    responses(
        (status = 204, description = "Override deleted"),
        (status = 404, description = "No override stored"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role_override(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role): Path<String>,
) -> Result<StatusCode, AppError> {
    require_permission(&state, &auth, modules::SETTINGS, Action::Manage).await?;

    state
        .permissions
        .delete_role_override(&role, &actor(&auth, &headers))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Overwrite the override for a role with its catalog defaults
#[utoipa::path(
    post,
    path = "/rbac/roles/{role}/reset",
    tag = "RBAC",
    params(
        ("role" = String, Path, description = "Role name"),
    ),
    responses(
        (status = 200, description = "Override reset", body = RoleOverride),
    ),
    security(("bearerAuth" = []))
)]
pub async fn reset_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role): Path<String>,
) -> Result<Json<RoleOverride>, AppError> {
    require_permission(&state, &auth, modules::SETTINGS, Action::Manage).await?;

    let stored = state
        .permissions
        .reset_role_to_defaults(&role, &actor(&auth, &headers))
        .await?;

    Ok(Json(stored))
}

// =============================================================================
// USER ENDPOINTS
// =============================================================================

/// Resolve the effective permissions of a user
#[utoipa::path(
    get,
    path = "/rbac/users/{user_id}/effective-permissions",
    tag = "RBAC",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Effective permissions", body = EffectivePermissionsResponse),
        (status = 404, description = "User not found"),
        (status = 503, description = "Role override store unavailable"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_effective_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<EffectivePermissionsResponse>, AppError> {
    guard_user_read(&state, &auth, &user_id).await?;

    let (user, resolution) = state.permissions.resolve_user(&user_id).await?;
    tracing::debug!(user_id = %user_id, source = ?resolution.base_source, "resolved permissions");

    Ok(Json(EffectivePermissionsResponse::new(&user, resolution)))
}

/// Whether the admin panel is visible to a user
#[utoipa::path(
    get,
    path = "/rbac/users/{user_id}/admin-panel",
    tag = "RBAC",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Admin panel visibility", body = AdminPanelResponse),
        (status = 404, description = "User not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_admin_panel(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<AdminPanelResponse>, AppError> {
    guard_user_read(&state, &auth, &user_id).await?;

    let visible = state.permissions.admin_panel_visible(&user_id).await?;
    Ok(Json(AdminPanelResponse { user_id, visible }))
}

/// Change a user's role
#[utoipa::path(
    put,
    path = "/rbac/users/{user_id}/role",
    tag = "RBAC",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = UserPermissionsResponse),
        (status = 404, description = "User not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(req): Json<AssignRoleRequest>,
) -> Result<Json<UserPermissionsResponse>, AppError> {
    require_permission(&state, &auth, modules::USERS, Action::Manage).await?;

    let user = state
        .permissions
        .assign_role(&user_id, &req.role, &actor(&auth, &headers))
        .await?;

    Ok(Json(user.into()))
}

/// Set or remove the personal replacement of a user's role grants
#[utoipa::path(
    put,
    path = "/rbac/users/{user_id}/role-permissions",
    tag = "RBAC",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    request_body = SetRolePermissionsRequest,
    responses(
        (status = 200, description = "Role permissions updated", body = UserPermissionsResponse),
        (status = 400, description = "Malformed grant"),
        (status = 404, description = "User not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_role_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(req): Json<SetRolePermissionsRequest>,
) -> Result<Json<UserPermissionsResponse>, AppError> {
    require_permission(&state, &auth, modules::USERS, Action::Manage).await?;

    let user = state
        .permissions
        .set_user_role_permissions(&user_id, req.modules, &actor(&auth, &headers))
        .await?;

    Ok(Json(user.into()))
}

/// Grant actions on a module to a user
#[utoipa::path(
    post,
    path = "/rbac/users/{user_id}/permissions/grant",
    tag = "RBAC",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    request_body = ModuleActionsRequest,
    responses(
        (status = 200, description = "Grant recorded", body = UserPermissionsResponse),
        (status = 400, description = "Malformed grant"),
        (status = 404, description = "User not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn grant_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(req): Json<ModuleActionsRequest>,
) -> Result<Json<UserPermissionsResponse>, AppError> {
    require_permission(&state, &auth, modules::USERS, Action::Manage).await?;

    let user = state
        .permissions
        .grant_to_user(&user_id, &req.module, &req.actions, &actor(&auth, &headers))
        .await?;

    Ok(Json(user.into()))
}

/// Revoke actions on a module from a user
#[utoipa::path(
    post,
    path = "/rbac/users/{user_id}/permissions/revoke",
    tag = "RBAC",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    request_body = ModuleActionsRequest,
    responses(
        (status = 200, description = "Revoke recorded", body = UserPermissionsResponse),
        (status = 400, description = "Malformed grant"),
        (status = 404, description = "User not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(req): Json<ModuleActionsRequest>,
) -> Result<Json<UserPermissionsResponse>, AppError> {
    require_permission(&state, &auth, modules::USERS, Action::Manage).await?;

    let user = state
        .permissions
        .revoke_from_user(&user_id, &req.module, &req.actions, &actor(&auth, &headers))
        .await?;

    Ok(Json(user.into()))
}

/// Remove a user's grant/revoke overlay entirely
#[utoipa::path(
    delete,
    path = "/rbac/users/{user_id}/custom-permissions",
    tag = "RBAC",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Overlay cleared", body = UserPermissionsResponse),
        (status = 404, description = "User not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn clear_custom_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<UserPermissionsResponse>, AppError> {
    require_permission(&state, &auth, modules::USERS, Action::Manage).await?;

    let user = state
        .permissions
        .clear_custom_permissions(&user_id, &actor(&auth, &headers))
        .await?;

    Ok(Json(user.into()))
}
