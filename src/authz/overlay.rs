use serde::{Deserialize, Serialize};

use super::grant::{merge_grant, ModuleGrant};

/// Per-user grant/revoke patches applied on top of the resolved role grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPermissions {
    #[serde(default)]
    pub granted: Vec<ModuleGrant>,
    #[serde(default)]
    pub revoked: Vec<ModuleGrant>,
}

impl CustomPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_granted(mut self, granted: Vec<ModuleGrant>) -> Self {
        self.granted = granted;
        self
    }

    pub fn with_revoked(mut self, revoked: Vec<ModuleGrant>) -> Self {
        self.revoked = revoked;
        self
    }

    pub fn grant(&mut self, grant: ModuleGrant) {
        merge_grant(&mut self.granted, grant);
    }

    pub fn revoke(&mut self, grant: ModuleGrant) {
        merge_grant(&mut self.revoked, grant);
    }

    pub fn is_empty(&self) -> bool {
        self.granted.is_empty() && self.revoked.is_empty()
    }

    /// True when every action of `grant` is already revoked on its module, so
    /// storing it changes nothing in the resolved set.
    pub fn revoke_cancels(&self, grant: &ModuleGrant) -> bool {
        !grant.actions().is_empty()
            && grant.actions().iter().all(|action| {
                self.revoked
                    .iter()
                    .any(|revoked| revoked.module() == grant.module() && revoked.contains(*action))
            })
    }
}
