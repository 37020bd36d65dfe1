use std::collections::BTreeMap;

use super::grant::{Action, ModuleGrant};
use super::{modules, roles};

/// Source of the built-in default grants for each role.
pub trait RoleCatalog: Send + Sync {
    /// Default grants for `role`. Unknown roles yield an empty list.
    fn default_grants(&self, role: &str) -> Vec<ModuleGrant>;

    /// Roles that carry catalog defaults.
    fn known_roles(&self) -> Vec<String>;
}

const ALL: &[Action] = &Action::ALL;
const VIEW: &[Action] = &[Action::View];
const VIEW_CREATE: &[Action] = &[Action::View, Action::Create];
const VIEW_CREATE_UPDATE: &[Action] = &[Action::View, Action::Create, Action::Update];
const VIEW_UPDATE: &[Action] = &[Action::View, Action::Update];

/// Immutable catalog of the six built-in church roles.
#[derive(Debug, Clone)]
pub struct BuiltinRoleCatalog {
    entries: BTreeMap<String, Vec<ModuleGrant>>,
}

impl BuiltinRoleCatalog {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();

        entries.insert(
            roles::ADMIN.to_string(),
            modules::ALL
                .iter()
                .map(|module| ModuleGrant::builtin(*module, ALL))
                .collect(),
        );

        entries.insert(
            roles::SECRETARY.to_string(),
            vec![
                ModuleGrant::builtin(modules::MEMBERS, ALL),
                ModuleGrant::builtin(modules::VISITORS, ALL),
                ModuleGrant::builtin(modules::EVENTS, VIEW_CREATE_UPDATE),
                ModuleGrant::builtin(modules::ASSISTANCE, VIEW_CREATE_UPDATE),
                ModuleGrant::builtin(modules::PRAYER_REQUESTS, VIEW_CREATE_UPDATE),
                ModuleGrant::builtin(modules::ASSETS, VIEW_CREATE_UPDATE),
                ModuleGrant::builtin(modules::NOTIFICATIONS, VIEW_CREATE),
                ModuleGrant::builtin(modules::FORUM, VIEW_CREATE),
                ModuleGrant::builtin(modules::USERS, VIEW),
                ModuleGrant::builtin(modules::BLOG, VIEW),
                ModuleGrant::builtin(modules::DEVOTIONALS, VIEW),
            ],
        );

        entries.insert(
            roles::PROFESSIONAL.to_string(),
            vec![
                ModuleGrant::builtin(modules::ASSISTANCE, VIEW_CREATE_UPDATE),
                ModuleGrant::builtin(modules::MEMBERS, VIEW),
                ModuleGrant::builtin(modules::EVENTS, VIEW),
                ModuleGrant::builtin(modules::FORUM, VIEW_CREATE),
                ModuleGrant::builtin(modules::DEVOTIONALS, VIEW),
                ModuleGrant::builtin(modules::PRAYER_REQUESTS, VIEW_CREATE),
            ],
        );

        entries.insert(
            roles::LEADER.to_string(),
            vec![
                ModuleGrant::builtin(modules::LEADERSHIP, VIEW_CREATE_UPDATE),
                ModuleGrant::builtin(modules::MEMBERS, VIEW_UPDATE),
                ModuleGrant::builtin(modules::EVENTS, VIEW_CREATE_UPDATE),
                ModuleGrant::builtin(modules::VISITORS, VIEW_CREATE),
                ModuleGrant::builtin(modules::FORUM, VIEW_CREATE),
                ModuleGrant::builtin(modules::DEVOTIONALS, VIEW_CREATE),
                ModuleGrant::builtin(modules::PRAYER_REQUESTS, VIEW_CREATE_UPDATE),
                ModuleGrant::builtin(modules::PROJECTS, VIEW),
            ],
        );

        entries.insert(
            roles::MEMBER.to_string(),
            vec![
                ModuleGrant::builtin(modules::EVENTS, VIEW),
                ModuleGrant::builtin(modules::BLOG, VIEW),
                ModuleGrant::builtin(modules::DEVOTIONALS, VIEW),
                ModuleGrant::builtin(modules::FORUM, VIEW_CREATE),
                ModuleGrant::builtin(modules::PRAYER_REQUESTS, VIEW_CREATE),
                ModuleGrant::builtin(modules::TRANSMISSIONS, VIEW),
                ModuleGrant::builtin(modules::PROJECTS, VIEW),
                ModuleGrant::builtin(modules::ONG, VIEW),
            ],
        );

        entries.insert(
            roles::FINANCE.to_string(),
            vec![
                ModuleGrant::builtin(modules::FINANCE, ALL),
                ModuleGrant::builtin(modules::ASSETS, VIEW_CREATE_UPDATE),
                ModuleGrant::builtin(modules::ONG, VIEW_UPDATE),
                ModuleGrant::builtin(modules::MEMBERS, VIEW),
                ModuleGrant::builtin(modules::PROJECTS, VIEW),
                ModuleGrant::builtin(modules::FORUM, VIEW_CREATE),
            ],
        );

        Self { entries }
    }
}

impl Default for BuiltinRoleCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleCatalog for BuiltinRoleCatalog {
    fn default_grants(&self, role: &str) -> Vec<ModuleGrant> {
        self.entries.get(role).cloned().unwrap_or_default()
    }

    fn known_roles(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::EffectivePermissions;

    #[test]
    fn knows_the_six_builtin_roles() {
        let catalog = BuiltinRoleCatalog::new();
        let mut expected: Vec<String> = roles::BUILTIN.iter().map(|r| r.to_string()).collect();
        expected.sort();
        assert_eq!(catalog.known_roles(), expected);
    }

    #[test]
    fn unknown_role_has_no_defaults() {
        let catalog = BuiltinRoleCatalog::new();
        assert!(catalog.default_grants("worship_team").is_empty());
        assert!(catalog.default_grants("").is_empty());
    }

    #[test]
    fn admin_has_every_action_on_every_module() {
        let catalog = BuiltinRoleCatalog::new();
        let effective: EffectivePermissions = catalog.default_grants(roles::ADMIN).iter().collect();
        for module in modules::ALL {
            for action in Action::ALL {
                assert!(effective.can(module, action), "admin lacks {module}:{action}");
            }
        }
    }

    #[test]
    fn member_defaults_carry_no_manage() {
        let catalog = BuiltinRoleCatalog::new();
        let grants = catalog.default_grants(roles::MEMBER);
        assert!(grants.iter().all(|grant| !grant.contains(Action::Manage)));

        let effective: EffectivePermissions = grants.iter().collect();
        assert!(effective.can(modules::FORUM, Action::View));
        assert!(effective.can(modules::FORUM, Action::Create));
    }
}
