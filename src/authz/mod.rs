//! Authorization module - permission resolution engine and route guards
//!
//! Effective permissions are resolved per request from three layers:
//! - the built-in role catalog
//! - admin-edited role overrides
//! - the per-user overlay (`role_permissions` replacement, grant/revoke patches)
//!
//! The admin panel is visible when the result holds `manage` on any
//! admin-relevant module. Guard enforcement is configurable (off/advisory/strict).

mod catalog;
mod effective;
mod evaluator;
mod grant;
mod overlay;
mod principal;
mod resolver;
pub mod service;
mod visibility;

pub use catalog::{BuiltinRoleCatalog, RoleCatalog};
pub use effective::EffectivePermissions;
pub use evaluator::{DefaultPolicyEvaluator, PolicyEvaluator};
pub use grant::{merge_grant, Action, GrantInput, ModuleGrant};
pub use overlay::CustomPermissions;
pub use principal::Principal;
pub use resolver::{
    resolve, BaseSource, PermissionResolver, Resolution, ResolutionTrace, RoleOverrideLookup,
    SourceState,
};
pub use service::{AuditActor, PermissionService, RoleDetails, RoleSummary};
pub use visibility::{has_manage_on_admin_modules, ADMIN_PANEL_MODULES};

/// Authorization enforcement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthzMode {
    /// No permission checks (development mode)
    #[default]
    Off,
    /// Log denials but allow requests (testing mode)
    Advisory,
    /// Enforce 403 on denied requests (production mode)
    Strict,
}

impl AuthzMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "advisory" => AuthzMode::Advisory,
            "strict" => AuthzMode::Strict,
            _ => AuthzMode::Off,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(&std::env::var("AUTHZ_MODE").unwrap_or_default())
    }
}

/// Well-known role names
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const SECRETARY: &str = "secretary";
    pub const PROFESSIONAL: &str = "professional";
    pub const LEADER: &str = "leader";
    pub const MEMBER: &str = "member";
    pub const FINANCE: &str = "finance";

    pub const BUILTIN: &[&str] = &[ADMIN, SECRETARY, PROFESSIONAL, LEADER, MEMBER, FINANCE];
}

/// Well-known module names
pub mod modules {
    pub const USERS: &str = "users";
    pub const MEMBERS: &str = "members";
    pub const EVENTS: &str = "events";
    pub const BLOG: &str = "blog";
    pub const FINANCE: &str = "finance";
    pub const ASSISTANCE: &str = "assistance";
    pub const LEADERSHIP: &str = "leadership";
    pub const TRANSMISSIONS: &str = "transmissions";
    pub const PROJECTS: &str = "projects";
    pub const DEVOTIONALS: &str = "devotionals";
    pub const FORUM: &str = "forum";
    pub const VISITORS: &str = "visitors";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const SETTINGS: &str = "settings";
    pub const ONG: &str = "ong";
    pub const PRAYER_REQUESTS: &str = "prayer_requests";
    pub const ASSETS: &str = "assets";

    pub const ALL: &[&str] = &[
        USERS,
        MEMBERS,
        EVENTS,
        BLOG,
        FINANCE,
        ASSISTANCE,
        LEADERSHIP,
        TRANSMISSIONS,
        PROJECTS,
        DEVOTIONALS,
        FORUM,
        VISITORS,
        NOTIFICATIONS,
        SETTINGS,
        ONG,
        PRAYER_REQUESTS,
        ASSETS,
    ];
}
