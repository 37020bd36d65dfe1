use chrono::Utc;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::SqlitePool;

use crate::authz::{CustomPermissions, ModuleGrant};
use crate::errors::{AppError, AppResult};
use crate::models::user::UserRecord;

use super::row_parsers::{decode_document, encode_document, user_from_row};

const USER_COLUMNS: &str =
    "id, email, display_name, role, role_permissions, custom_permissions, created_at, updated_at";

/// Store adapter for user profile documents.
///
/// Every mutation is a single UPDATE, or one write-locked transaction for the
/// overlay read-modify-write, so a concurrent reader never observes a
/// half-written permission document.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, id: &str) -> AppResult<Option<UserRecord>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn get(&self, id: &str) -> AppResult<UserRecord> {
        self.find(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user '{id}' not found")))
    }

    pub async fn list(&self) -> AppResult<Vec<UserRecord>> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(user_from_row).collect()
    }

    pub async fn upsert(&self, user: &UserRecord) -> AppResult<()> {
        let role_permissions = user
            .role_permissions
            .as_ref()
            .map(|grants| encode_document("role_permissions", grants))
            .transpose()?;
        let custom_permissions = user
            .custom_permissions
            .as_ref()
            .map(|custom| encode_document("custom_permissions", custom))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, role, role_permissions, custom_permissions, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                display_name = excluded.display_name,
                role = excluded.role,
                role_permissions = excluded.role_permissions,
                custom_permissions = excluded.custom_permissions,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.role)
        .bind(role_permissions)
        .bind(custom_permissions)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_role(&self, id: &str, role: &str) -> AppResult<UserRecord> {
        let row = sqlx::query(&format!(
            "UPDATE users SET role = ?, updated_at = ? WHERE id = ? RETURNING {USER_COLUMNS}"
        ))
        .bind(role)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user '{id}' not found")))?;

        user_from_row(&row)
    }

    /// Sets or clears (`None`) the personal role permission replacement.
    pub async fn update_role_permissions(
        &self,
        id: &str,
        grants: Option<&[ModuleGrant]>,
    ) -> AppResult<UserRecord> {
        let encoded = grants
            .map(|grants| encode_document("role_permissions", &grants))
            .transpose()?;

        let row = sqlx::query(&format!(
            "UPDATE users SET role_permissions = ?, updated_at = ? WHERE id = ? RETURNING {USER_COLUMNS}"
        ))
        .bind(encoded)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user '{id}' not found")))?;

        user_from_row(&row)
    }

    /// Read-modify-write of the `custom_permissions` document.
    ///
    /// Runs under `BEGIN IMMEDIATE` so the write lock is taken before the read.
    /// Concurrent callers queue on the busy timeout instead of failing the lock
    /// upgrade a deferred transaction would attempt.
    pub async fn modify_custom_permissions<F>(&self, id: &str, apply: F) -> AppResult<UserRecord>
    where
        F: FnOnce(&mut CustomPermissions) + Send,
    {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = rewrite_custom_permissions(&mut conn, id, apply).await;
        match result {
            Ok(row) => {
                if let Err(err) = sqlx::query("COMMIT").execute(&mut *conn).await {
                    drop(conn.detach());
                    return Err(err.into());
                }
                user_from_row(&row)
            }
            Err(err) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    tracing::error!(user_id = %id, error = %rollback, "rollback of custom permissions update failed");
                    // The connection may still hold the write lock; keep it out of the pool.
                    drop(conn.detach());
                }
                Err(err)
            }
        }
    }

    /// Removes the field entirely; the column goes back to NULL.
    pub async fn clear_custom_permissions(&self, id: &str) -> AppResult<UserRecord> {
        let row = sqlx::query(&format!(
            "UPDATE users SET custom_permissions = NULL, updated_at = ? WHERE id = ? RETURNING {USER_COLUMNS}"
        ))
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user '{id}' not found")))?;

        user_from_row(&row)
    }

    /// Returns the ids of the users whose overlay was removed.
    pub async fn clear_all_custom_permissions(&self) -> AppResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "UPDATE users SET custom_permissions = NULL, updated_at = ? WHERE custom_permissions IS NOT NULL RETURNING id",
        )
        .bind(Utc::now().to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

async fn rewrite_custom_permissions<F>(
    conn: &mut SqliteConnection,
    id: &str,
    apply: F,
) -> AppResult<SqliteRow>
where
    F: FnOnce(&mut CustomPermissions) + Send,
{
    let current: Option<Option<String>> =
        sqlx::query_scalar("SELECT custom_permissions FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    let current = current.ok_or_else(|| AppError::not_found(format!("user '{id}' not found")))?;

    let mut custom: CustomPermissions = match current {
        Some(raw) if !raw.trim().is_empty() => decode_document("custom_permissions", &raw)?,
        _ => CustomPermissions::new(),
    };
    apply(&mut custom);

    let row = sqlx::query(&format!(
        "UPDATE users SET custom_permissions = ?, updated_at = ? WHERE id = ? RETURNING {USER_COLUMNS}"
    ))
    .bind(encode_document("custom_permissions", &custom)?)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}
