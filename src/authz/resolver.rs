use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::catalog::RoleCatalog;
use super::effective::EffectivePermissions;
use super::grant::ModuleGrant;
use crate::errors::{AppError, AppResult};
use crate::models::role_override::RoleOverride;
use crate::models::user::UserRecord;

/// Read port onto the role override collection.
///
/// Implementations must report store failures as `OverrideLookupFailed`
/// rather than `Ok(None)`.
#[async_trait]
pub trait RoleOverrideLookup: Send + Sync {
    async fn find_role_override(&self, role: &str) -> AppResult<Option<RoleOverride>>;
}

/// Which layer supplied the base grant list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseSource {
    UserRolePermissions,
    RoleOverride,
    CatalogDefaults,
}

/// What one priority step saw while resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceState {
    NotConsulted,
    Absent,
    Empty,
    Selected { grants: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionTrace {
    pub user_role_permissions: SourceState,
    pub role_override: SourceState,
    pub catalog_defaults: SourceState,
    pub granted: usize,
    pub revoked: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub base_source: BaseSource,
    pub trace: ResolutionTrace,
    pub effective: EffectivePermissions,
}

/// Computes the effective permissions for `user`.
///
/// `role_override` is the already-fetched override document for `user.role`; it is
/// ignored when the user carries a non-empty `role_permissions` list.
pub fn resolve(
    user: &UserRecord,
    role_override: Option<&RoleOverride>,
    catalog: &dyn RoleCatalog,
) -> Resolution {
    let personal = user.role_permissions.as_deref();
    let catalog_defaults;

    let (base_source, base, trace_base): (BaseSource, &[ModuleGrant], [SourceState; 3]) =
        match personal {
            Some(grants) if !grants.is_empty() => (
                BaseSource::UserRolePermissions,
                grants,
                [
                    SourceState::Selected { grants: grants.len() },
                    SourceState::NotConsulted,
                    SourceState::NotConsulted,
                ],
            ),
            _ => {
                let personal_state = presence(personal.map(<[ModuleGrant]>::len));
                match role_override {
                    Some(found) if !found.modules.is_empty() => (
                        BaseSource::RoleOverride,
                        found.modules.as_slice(),
                        [
                            personal_state,
                            SourceState::Selected { grants: found.modules.len() },
                            SourceState::NotConsulted,
                        ],
                    ),
                    _ => {
                        catalog_defaults = catalog.default_grants(&user.role);
                        (
                            BaseSource::CatalogDefaults,
                            catalog_defaults.as_slice(),
                            [
                                personal_state,
                                presence(role_override.map(|found| found.modules.len())),
                                SourceState::Selected { grants: catalog_defaults.len() },
                            ],
                        )
                    }
                }
            }
        };

    let mut effective: EffectivePermissions = base.iter().collect();

    let (granted, revoked) = match &user.custom_permissions {
        Some(custom) => {
            effective.grant_all(&custom.granted);
            effective.revoke_all(&custom.revoked);
            (custom.granted.len(), custom.revoked.len())
        }
        None => (0, 0),
    };

    let [user_role_permissions, role_override_state, catalog_state] = trace_base;

    Resolution {
        base_source,
        trace: ResolutionTrace {
            user_role_permissions,
            role_override: role_override_state,
            catalog_defaults: catalog_state,
            granted,
            revoked,
        },
        effective,
    }
}

fn presence(len: Option<usize>) -> SourceState {
    match len {
        None => SourceState::Absent,
        Some(_) => SourceState::Empty,
    }
}

/// Resolution with its two collaborators injected.
#[derive(Clone)]
pub struct PermissionResolver {
    catalog: Arc<dyn RoleCatalog>,
    overrides: Arc<dyn RoleOverrideLookup>,
}

impl PermissionResolver {
    pub fn new(catalog: Arc<dyn RoleCatalog>, overrides: Arc<dyn RoleOverrideLookup>) -> Self {
        Self { catalog, overrides }
    }

    pub fn catalog(&self) -> &Arc<dyn RoleCatalog> {
        &self.catalog
    }

    /// Fetches the role override only when the user's personal list does not win.
    pub async fn resolve(&self, user: &UserRecord) -> AppResult<Resolution> {
        let personal_wins = user
            .role_permissions
            .as_ref()
            .map(|grants| !grants.is_empty())
            .unwrap_or(false);

        let role_override = if personal_wins {
            None
        } else {
            self.overrides
                .find_role_override(&user.role)
                .await
                .map_err(|err| match err {
                    AppError::OverrideLookupFailed(_) => err,
                    other => AppError::override_lookup_failed(other.to_string()),
                })?
        };

        let resolution = resolve(user, role_override.as_ref(), self.catalog.as_ref());

        tracing::debug!(
            user_id = %user.id,
            role = %user.role,
            source = ?resolution.base_source,
            modules = resolution.effective.len(),
            "resolved permissions"
        );

        Ok(resolution)
    }
}
