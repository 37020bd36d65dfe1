use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};

/// A capability within a module.
///
/// Declaration order is the canonical order used when action sets are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Create,
    Update,
    Delete,
    Manage,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::View,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Manage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Manage => "manage",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Action::View),
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "manage" => Ok(Action::Manage),
            other => Err(AppError::invalid_grant(format!(
                "unknown action '{other}', expected one of view, create, update, delete, manage"
            ))),
        }
    }
}

/// Unvalidated grant as it travels over the wire and sits in stored documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GrantInput {
    #[schema(example = "members")]
    pub module: String,
    #[schema(example = json!(["view", "update"]))]
    pub actions: Vec<String>,
}

impl GrantInput {
    pub fn new(module: impl Into<String>, actions: &[&str]) -> Self {
        Self {
            module: module.into(),
            actions: actions.iter().map(|action| action.to_string()).collect(),
        }
    }

    /// Validates a whole list, failing on the first malformed entry.
    pub fn validate_all(inputs: Vec<GrantInput>) -> AppResult<Vec<ModuleGrant>> {
        inputs.into_iter().map(ModuleGrant::try_from).collect()
    }
}

/// A module together with the actions granted on it.
///
/// Only constructible through validation, so every value holds known actions
/// and a non-empty module name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GrantInput", into = "GrantInput")]
pub struct ModuleGrant {
    module: String,
    actions: BTreeSet<Action>,
}

impl ModuleGrant {
    pub fn new<I, S>(module: impl Into<String>, actions: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let actions = actions
            .into_iter()
            .map(|action| action.as_ref().parse::<Action>())
            .collect::<AppResult<BTreeSet<_>>>()?;
        Self::with_actions(module, actions)
    }

    pub fn with_actions(
        module: impl Into<String>,
        actions: impl IntoIterator<Item = Action>,
    ) -> AppResult<Self> {
        let module = module.into().trim().to_string();
        if module.is_empty() {
            return Err(AppError::invalid_grant("module name must not be empty"));
        }

        Ok(Self {
            module,
            actions: actions.into_iter().collect(),
        })
    }

    /// Grants for the built-in catalog; module names are compile-time literals.
    pub(crate) fn builtin(module: &'static str, actions: &[Action]) -> Self {
        Self {
            module: module.to_string(),
            actions: actions.iter().copied().collect(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn actions(&self) -> &BTreeSet<Action> {
        &self.actions
    }

    pub fn contains(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

impl TryFrom<GrantInput> for ModuleGrant {
    type Error = AppError;

    fn try_from(value: GrantInput) -> Result<Self, Self::Error> {
        ModuleGrant::new(value.module, value.actions)
    }
}

impl From<ModuleGrant> for GrantInput {
    fn from(value: ModuleGrant) -> Self {
        GrantInput {
            module: value.module,
            actions: value
                .actions
                .iter()
                .map(|action| action.as_str().to_string())
                .collect(),
        }
    }
}

/// Folds `grant` into `list`, unioning actions when the module is already listed.
pub fn merge_grant(list: &mut Vec<ModuleGrant>, grant: ModuleGrant) {
    match list.iter_mut().find(|existing| existing.module == grant.module) {
        Some(existing) => existing.actions.extend(grant.actions),
        None if grant.actions.is_empty() => {}
        None => list.push(grant),
    }
}
