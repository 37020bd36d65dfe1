//! Permission orchestration shared by the HTTP routes and the maintenance CLI.
//!
//! Mutations validate their input before touching the store and perform one
//! document write each. Successful mutations are published on the event bus.

use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use super::catalog::RoleCatalog;
use super::grant::{GrantInput, ModuleGrant};
use super::resolver::{PermissionResolver, Resolution};
use super::visibility::has_manage_on_admin_modules;
use crate::db::{RoleOverrideRepository, UserRepository};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, EventBus, Loggable, RequestContext};
use crate::models::role_override::RoleOverride;
use crate::models::user::UserRecord;

/// Who is performing a mutation, for the audit trail.
#[derive(Debug, Clone, Default)]
pub struct AuditActor {
    pub id: Option<String>,
    pub context: Option<RequestContext>,
}

impl AuditActor {
    pub fn user(id: impl Into<String>, context: Option<RequestContext>) -> Self {
        Self {
            id: Some(id.into()),
            context,
        }
    }

    pub fn system(name: impl Into<String>) -> Self {
        Self {
            id: Some(name.into()),
            context: None,
        }
    }

    fn name(&self) -> String {
        self.id.clone().unwrap_or_else(|| "system".to_string())
    }
}

/// Catalog defaults next to the stored override for one role.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleDetails {
    pub role: String,
    pub builtin: bool,
    #[schema(value_type = Vec<GrantInput>)]
    pub defaults: Vec<ModuleGrant>,
    #[serde(rename = "override")]
    pub role_override: Option<RoleOverride>,
    /// Grants a user of this role starts from before any personal overlay.
    #[schema(value_type = Vec<GrantInput>)]
    pub active: Vec<ModuleGrant>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleSummary {
    pub role: String,
    pub builtin: bool,
    pub has_override: bool,
}

#[derive(Clone)]
pub struct PermissionService {
    resolver: PermissionResolver,
    users: UserRepository,
    overrides: RoleOverrideRepository,
    event_bus: Option<EventBus>,
}

impl PermissionService {
    pub fn new(
        catalog: Arc<dyn RoleCatalog>,
        users: UserRepository,
        overrides: RoleOverrideRepository,
        event_bus: Option<EventBus>,
    ) -> Self {
        let lookup = Arc::new(overrides.clone());
        Self {
            resolver: PermissionResolver::new(catalog, lookup),
            users,
            overrides,
            event_bus,
        }
    }

    /// Service over the SQLite store using the given catalog.
    pub fn from_pool(pool: SqlitePool, catalog: Arc<dyn RoleCatalog>, event_bus: Option<EventBus>) -> Self {
        Self::new(
            catalog,
            UserRepository::new(pool.clone()),
            RoleOverrideRepository::new(pool),
            event_bus,
        )
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn catalog(&self) -> &Arc<dyn RoleCatalog> {
        self.resolver.catalog()
    }

    fn audit<T: Loggable>(&self, action: &str, actor: &AuditActor, entity: &T, old: Option<&T>) {
        if let Some(bus) = &self.event_bus {
            log_activity_with_context(bus, action, actor.id.clone(), entity, old, actor.context.clone());
        }
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    pub async fn resolve_user(&self, user_id: &str) -> AppResult<(UserRecord, Resolution)> {
        let user = self.users.get(user_id).await?;
        let resolution = self.resolver.resolve(&user).await?;
        Ok((user, resolution))
    }

    pub async fn resolve_record(&self, user: &UserRecord) -> AppResult<Resolution> {
        self.resolver.resolve(user).await
    }

    pub async fn admin_panel_visible(&self, user_id: &str) -> AppResult<bool> {
        let (_, resolution) = self.resolve_user(user_id).await?;
        Ok(has_manage_on_admin_modules(&resolution.effective))
    }

    // =========================================================================
    // ROLE OVERRIDES
    // =========================================================================

    pub async fn list_roles(&self) -> AppResult<Vec<RoleSummary>> {
        let known = self.catalog().known_roles();
        let overrides = self.overrides.list().await?;

        let mut summaries: Vec<RoleSummary> = known
            .iter()
            .map(|role| RoleSummary {
                role: role.clone(),
                builtin: true,
                has_override: overrides.iter().any(|o| &o.role == role),
            })
            .collect();

        // Custom roles only exist through their override document.
        summaries.extend(
            overrides
                .iter()
                .filter(|o| !known.contains(&o.role))
                .map(|o| RoleSummary {
                    role: o.role.clone(),
                    builtin: false,
                    has_override: true,
                }),
        );

        Ok(summaries)
    }

    pub async fn role_details(&self, role: &str) -> AppResult<RoleDetails> {
        let role = normalize_role(role)?;
        let defaults = self.catalog().default_grants(&role);
        let builtin = self.catalog().known_roles().contains(&role);
        let role_override = self.overrides.find(&role).await?;

        let active = match &role_override {
            Some(found) if !found.modules.is_empty() => found.modules.clone(),
            _ => defaults.clone(),
        };

        Ok(RoleDetails {
            role,
            builtin,
            defaults,
            role_override,
            active,
        })
    }

    /// Replaces the override for `role` wholesale.
    pub async fn set_role_override(
        &self,
        role: &str,
        modules: Vec<GrantInput>,
        actor: &AuditActor,
    ) -> AppResult<RoleOverride> {
        let role = normalize_role(role)?;
        let modules = GrantInput::validate_all(modules)?;
        self.write_override(role, modules, actor, "updated").await
    }

    /// Overwrites the override for `role` with the catalog defaults.
    pub async fn reset_role_to_defaults(&self, role: &str, actor: &AuditActor) -> AppResult<RoleOverride> {
        let role = normalize_role(role)?;
        let defaults = self.catalog().default_grants(&role);
        self.write_override(role, defaults, actor, "reset").await
    }

    /// Resets every catalog role; returns the written documents.
    pub async fn reset_all_roles_to_defaults(&self, actor: &AuditActor) -> AppResult<Vec<RoleOverride>> {
        let mut written = Vec::new();
        for role in self.catalog().known_roles() {
            written.push(self.reset_role_to_defaults(&role, actor).await?);
        }
        tracing::info!(roles = written.len(), "reset all roles to catalog defaults");
        Ok(written)
    }

    pub async fn delete_role_override(&self, role: &str, actor: &AuditActor) -> AppResult<()> {
        let role = normalize_role(role)?;
        let existing = self
            .overrides
            .find(&role)
            .await?
            .ok_or_else(|| AppError::not_found(format!("no override stored for role '{role}'")))?;

        self.overrides.delete(&role).await?;
        tracing::info!(role = %role, "role override deleted");
        self.audit("deleted", actor, &existing, None);
        Ok(())
    }

    async fn write_override(
        &self,
        role: String,
        modules: Vec<ModuleGrant>,
        actor: &AuditActor,
        action: &str,
    ) -> AppResult<RoleOverride> {
        let previous = self.overrides.find(&role).await?;
        let role_override = RoleOverride::new(role, modules, actor.name());
        self.overrides.upsert(&role_override).await?;

        tracing::info!(
            role = %role_override.role,
            modules = role_override.modules.len(),
            updated_by = %role_override.updated_by,
            "role override written"
        );
        self.audit(action, actor, &role_override, previous.as_ref());
        Ok(role_override)
    }

    // =========================================================================
    // USER OVERLAY
    // =========================================================================

    /// Merges `actions` into the user's `granted` entry for `module`.
    ///
    /// Revokes are applied after grants and a grant does not remove an earlier
    /// revoke of the same action. A grant whose actions are all revoked on the
    /// module is still stored, but has no effect until the revoke is cleared;
    /// that case is logged as a warning.
    pub async fn grant_to_user(
        &self,
        user_id: &str,
        module: &str,
        actions: &[String],
        actor: &AuditActor,
    ) -> AppResult<UserRecord> {
        let grant = ModuleGrant::new(module, actions)?;
        let previous = self.users.get(user_id).await?;
        let mut cancelled = false;
        let updated = self
            .users
            .modify_custom_permissions(user_id, |custom| {
                cancelled = custom.revoke_cancels(&grant);
                custom.grant(grant);
            })
            .await?;

        if cancelled {
            tracing::warn!(
                user_id = %user_id,
                module = %module,
                "granted actions are all revoked for this user and stay ineffective"
            );
        }
        tracing::info!(user_id = %user_id, module = %module, "custom permissions granted");
        self.audit("granted", actor, &updated, Some(&previous));
        Ok(updated)
    }

    pub async fn revoke_from_user(
        &self,
        user_id: &str,
        module: &str,
        actions: &[String],
        actor: &AuditActor,
    ) -> AppResult<UserRecord> {
        let revoke = ModuleGrant::new(module, actions)?;
        let previous = self.users.get(user_id).await?;
        let updated = self
            .users
            .modify_custom_permissions(user_id, |custom| custom.revoke(revoke))
            .await?;

        tracing::info!(user_id = %user_id, module = %module, "custom permissions revoked");
        self.audit("revoked", actor, &updated, Some(&previous));
        Ok(updated)
    }

    pub async fn clear_custom_permissions(&self, user_id: &str, actor: &AuditActor) -> AppResult<UserRecord> {
        let previous = self.users.get(user_id).await?;
        let updated = self.users.clear_custom_permissions(user_id).await?;

        tracing::info!(user_id = %user_id, "custom permissions cleared");
        self.audit("cleared", actor, &updated, Some(&previous));
        Ok(updated)
    }

    /// Returns the ids of the users that had an overlay.
    pub async fn clear_all_custom_permissions(&self, actor: &AuditActor) -> AppResult<Vec<String>> {
        let cleared = self.users.clear_all_custom_permissions().await?;
        tracing::info!(users = cleared.len(), "cleared all custom permissions");

        for user_id in &cleared {
            if let Some(user) = self.users.find(user_id).await? {
                self.audit("cleared", actor, &user, None);
            }
        }
        Ok(cleared)
    }

    /// Sets (`Some`) or removes (`None`) the personal role permission replacement.
    pub async fn set_user_role_permissions(
        &self,
        user_id: &str,
        modules: Option<Vec<GrantInput>>,
        actor: &AuditActor,
    ) -> AppResult<UserRecord> {
        let grants = modules.map(GrantInput::validate_all).transpose()?;
        let previous = self.users.get(user_id).await?;
        let updated = self
            .users
            .update_role_permissions(user_id, grants.as_deref())
            .await?;

        tracing::info!(user_id = %user_id, cleared = grants.is_none(), "role permissions updated");
        self.audit("role_permissions_updated", actor, &updated, Some(&previous));
        Ok(updated)
    }

    pub async fn assign_role(&self, user_id: &str, role: &str, actor: &AuditActor) -> AppResult<UserRecord> {
        let role = normalize_role(role)?;
        let previous = self.users.get(user_id).await?;
        let updated = self.users.update_role(user_id, &role).await?;

        tracing::info!(user_id = %user_id, role = %role, "role assigned");
        self.audit("role_assigned", actor, &updated, Some(&previous));
        Ok(updated)
    }
}

fn normalize_role(role: &str) -> AppResult<String> {
    let role = role.trim();
    if role.is_empty() {
        return Err(AppError::bad_request("role name must not be empty"));
    }
    Ok(role.to_string())
}
