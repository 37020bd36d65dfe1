use super::effective::EffectivePermissions;
use super::grant::Action;
use super::modules;

/// Modules whose `manage` action unlocks the administrative panel.
///
/// `forum` is deliberately absent: forum moderators do not get the panel.
pub const ADMIN_PANEL_MODULES: &[&str] = &[
    modules::USERS,
    modules::MEMBERS,
    modules::EVENTS,
    modules::BLOG,
    modules::FINANCE,
    modules::ASSISTANCE,
    modules::LEADERSHIP,
    modules::TRANSMISSIONS,
    modules::PROJECTS,
    modules::DEVOTIONALS,
    modules::VISITORS,
    modules::NOTIFICATIONS,
    modules::SETTINGS,
    modules::ONG,
];

pub fn has_manage_on_admin_modules(effective: &EffectivePermissions) -> bool {
    ADMIN_PANEL_MODULES
        .iter()
        .any(|module| effective.can(module, Action::Manage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::ModuleGrant;

    fn effective(grants: &[(&str, &[&str])]) -> EffectivePermissions {
        let grants: Vec<ModuleGrant> = grants
            .iter()
            .map(|(module, actions)| ModuleGrant::new(*module, *actions).unwrap())
            .collect();
        grants.iter().collect()
    }

    #[test]
    fn empty_set_is_not_visible() {
        assert!(!has_manage_on_admin_modules(&EffectivePermissions::new()));
    }

    #[test]
    fn non_manage_actions_do_not_count() {
        let set = effective(&[("members", &["view", "create", "update", "delete"])]);
        assert!(!has_manage_on_admin_modules(&set));
    }

    #[test]
    fn manage_on_any_admin_module_counts() {
        for module in ADMIN_PANEL_MODULES {
            let set = effective(&[(*module, &["manage"])]);
            assert!(has_manage_on_admin_modules(&set), "{module} should unlock the panel");
        }
    }

    #[test]
    fn manage_outside_the_list_does_not_count() {
        let set = effective(&[("forum", &["manage"]), ("prayer_requests", &["manage"])]);
        assert!(!has_manage_on_admin_modules(&set));
    }
}
