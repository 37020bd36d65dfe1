use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::authz::{CustomPermissions, GrantInput, ModuleGrant};
use crate::events::{Loggable, Severity};

/// User profile document as far as permission resolution is concerned.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UserRecord {
    #[schema(example = "u_8f2c1a")]
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[schema(example = "member")]
    pub role: String,
    /// Full replacement of the role's grants for this user.
    #[schema(value_type = Option<Vec<GrantInput>>)]
    pub role_permissions: Option<Vec<ModuleGrant>>,
    /// Grant/revoke overlay, `{ "granted": [...], "revoked": [...] }`.
    #[schema(value_type = Option<Object>)]
    pub custom_permissions: Option<CustomPermissions>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            email: None,
            display_name: None,
            role: role.into(),
            role_permissions: None,
            custom_permissions: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_role_permissions(mut self, grants: Vec<ModuleGrant>) -> Self {
        self.role_permissions = Some(grants);
        self
    }

    pub fn with_custom_permissions(mut self, custom: CustomPermissions) -> Self {
        self.custom_permissions = Some(custom);
        self
    }
}

impl Loggable for UserRecord {
    fn entity_type() -> &'static str { "user_permissions" }
    fn subject_id(&self) -> String { self.id.clone() }
    fn severity(&self) -> Severity { Severity::Critical }
}
