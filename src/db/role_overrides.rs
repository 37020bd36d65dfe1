use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::authz::RoleOverrideLookup;
use crate::errors::{AppError, AppResult};
use crate::models::role_override::RoleOverride;

use super::row_parsers::{encode_document, role_override_from_row};

/// Store adapter for the role override collection.
#[derive(Debug, Clone)]
pub struct RoleOverrideRepository {
    pool: SqlitePool,
}

impl RoleOverrideRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, role: &str) -> AppResult<Option<RoleOverride>> {
        let row = sqlx::query(
            "SELECT role, modules, updated_by, updated_at FROM role_overrides WHERE role = ?",
        )
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(role_override_from_row).transpose()
    }

    pub async fn list(&self) -> AppResult<Vec<RoleOverride>> {
        let rows = sqlx::query(
            "SELECT role, modules, updated_by, updated_at FROM role_overrides ORDER BY role",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(role_override_from_row).collect()
    }

    /// Replaces the override document for `role_override.role` wholesale.
    pub async fn upsert(&self, role_override: &RoleOverride) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO role_overrides (role, modules, updated_by, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(role) DO UPDATE SET
                modules = excluded.modules,
                updated_by = excluded.updated_by,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&role_override.role)
        .bind(encode_document("modules", &role_override.modules)?)
        .bind(&role_override.updated_by)
        .bind(role_override.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns whether a document was removed.
    pub async fn delete(&self, role: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM role_overrides WHERE role = ?")
            .bind(role)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RoleOverrideLookup for RoleOverrideRepository {
    async fn find_role_override(&self, role: &str) -> AppResult<Option<RoleOverride>> {
        self.find(role).await.map_err(|err| {
            tracing::error!(role = %role, error = %err, "role override lookup failed");
            match err {
                AppError::Database(db) => AppError::override_lookup_failed(db.to_string()),
                other => AppError::override_lookup_failed(other.to_string()),
            }
        })
    }
}
