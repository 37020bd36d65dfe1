use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::authz::{
    BaseSource, CustomPermissions, EffectivePermissions, GrantInput, ModuleGrant, Resolution,
    ResolutionTrace,
};
use crate::models::user::UserRecord;

// =============================================================================
// REQUESTS
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRoleOverrideRequest {
    pub modules: Vec<GrantInput>,
}

/// Body of the grant and revoke endpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ModuleActionsRequest {
    #[schema(example = "finance")]
    pub module: String,
    #[schema(example = json!(["view"]))]
    pub actions: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    #[schema(example = "leader")]
    pub role: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRolePermissionsRequest {
    /// `null` removes the personal replacement.
    #[serde(default)]
    pub modules: Option<Vec<GrantInput>>,
}

// =============================================================================
// RESPONSES
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePermissionsResponse {
    pub user_id: String,
    pub role: String,
    #[schema(value_type = String, example = "catalog_defaults")]
    pub base_source: BaseSource,
    #[schema(value_type = Object)]
    pub trace: ResolutionTrace,
    /// `{ "<module>": ["view", ...] }`
    #[schema(value_type = Object)]
    pub permissions: EffectivePermissions,
    pub admin_panel: bool,
}

impl EffectivePermissionsResponse {
    pub fn new(user: &UserRecord, resolution: Resolution) -> Self {
        let admin_panel = crate::authz::has_manage_on_admin_modules(&resolution.effective);
        Self {
            user_id: user.id.clone(),
            role: user.role.clone(),
            base_source: resolution.base_source,
            trace: resolution.trace,
            permissions: resolution.effective,
            admin_panel,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminPanelResponse {
    pub user_id: String,
    pub visible: bool,
}

/// Permission-related view of a user document after a mutation.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserPermissionsResponse {
    pub user_id: String,
    pub role: String,
    #[schema(value_type = Option<Vec<GrantInput>>)]
    pub role_permissions: Option<Vec<ModuleGrant>>,
    #[schema(value_type = Option<Object>)]
    pub custom_permissions: Option<CustomPermissions>,
}

impl From<UserRecord> for UserPermissionsResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
            role_permissions: user.role_permissions,
            custom_permissions: user.custom_permissions,
        }
    }
}
