use super::effective::EffectivePermissions;
use super::grant::Action;
use super::visibility::has_manage_on_admin_modules;

/// Principal represents the authenticated user with their resolved permissions
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub role: String,
    pub permissions: EffectivePermissions,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
            permissions: EffectivePermissions::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: EffectivePermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    pub fn has_permission(&self, module: &str, action: Action) -> bool {
        self.permissions.can(module, action)
    }

    pub fn sees_admin_panel(&self) -> bool {
        has_manage_on_admin_modules(&self.permissions)
    }
}
