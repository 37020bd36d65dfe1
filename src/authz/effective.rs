use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::grant::{Action, ModuleGrant};

/// Final module -> action-set mapping for one user.
///
/// A module whose action set becomes empty is removed, so every entry holds at
/// least one action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EffectivePermissions(BTreeMap<String, BTreeSet<Action>>);

impl EffectivePermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unions the grant's actions into the module entry.
    pub fn grant(&mut self, grant: &ModuleGrant) {
        if grant.actions().is_empty() {
            return;
        }
        self.0
            .entry(grant.module().to_string())
            .or_default()
            .extend(grant.actions().iter().copied());
    }

    pub fn grant_all<'a>(&mut self, grants: impl IntoIterator<Item = &'a ModuleGrant>) {
        for grant in grants {
            self.grant(grant);
        }
    }

    /// Removes the grant's actions from the module entry. Absent actions are ignored.
    pub fn revoke(&mut self, grant: &ModuleGrant) {
        let Some(actions) = self.0.get_mut(grant.module()) else {
            return;
        };
        for action in grant.actions() {
            actions.remove(action);
        }
        if actions.is_empty() {
            self.0.remove(grant.module());
        }
    }

    pub fn revoke_all<'a>(&mut self, grants: impl IntoIterator<Item = &'a ModuleGrant>) {
        for grant in grants {
            self.revoke(grant);
        }
    }

    pub fn can(&self, module: &str, action: Action) -> bool {
        self.0
            .get(module)
            .map(|actions| actions.contains(&action))
            .unwrap_or(false)
    }

    pub fn actions(&self, module: &str) -> Option<&BTreeSet<Action>> {
        self.0.get(module)
    }

    pub fn contains_module(&self, module: &str) -> bool {
        self.0.contains_key(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<Action>)> {
        self.0.iter().map(|(module, actions)| (module.as_str(), actions))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<&'a ModuleGrant> for EffectivePermissions {
    fn from_iter<T: IntoIterator<Item = &'a ModuleGrant>>(iter: T) -> Self {
        let mut effective = EffectivePermissions::new();
        effective.grant_all(iter);
        effective
    }
}
