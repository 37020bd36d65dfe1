use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::authz::{GrantInput, ModuleGrant};
use crate::events::{Loggable, Severity};

/// Admin-edited replacement for a role's catalog defaults, keyed by role name.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RoleOverride {
    #[schema(example = "professional")]
    pub role: String,
    #[schema(value_type = Vec<GrantInput>)]
    pub modules: Vec<ModuleGrant>,
    #[schema(example = "u_admin")]
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl RoleOverride {
    pub fn new(role: impl Into<String>, modules: Vec<ModuleGrant>, updated_by: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            modules,
            updated_by: updated_by.into(),
            updated_at: Utc::now(),
        }
    }
}

impl Loggable for RoleOverride {
    fn entity_type() -> &'static str { "role_override" }
    fn subject_id(&self) -> String { self.role.clone() }
    fn severity(&self) -> Severity { Severity::Critical }
}
