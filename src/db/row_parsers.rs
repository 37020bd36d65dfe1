use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::authz::{CustomPermissions, ModuleGrant};
use crate::errors::AppError;
use crate::models::role_override::RoleOverride;
use crate::models::user::UserRecord;

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // Try RFC3339 first (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try SQLite default timestamp format: "YYYY-MM-DD HH:MM:SS" (with optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range".to_string()))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

/// Decodes a JSON document column, reporting the offending path on failure.
pub fn decode_document<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T, AppError> {
    let de = &mut serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(de).map_err(|err| {
        AppError::internal(format!(
            "corrupt {} document at '{}': {}",
            column,
            err.path(),
            err.inner()
        ))
    })
}

fn decode_opt_document<T: DeserializeOwned>(column: &str, raw: Option<String>) -> Result<Option<T>, AppError> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => Ok(Some(decode_document(column, &raw)?)),
        _ => Ok(None),
    }
}

pub fn user_from_row(row: &SqliteRow) -> Result<UserRecord, AppError> {
    let id: String = row.try_get("id").map_err(|e| AppError::internal(format!("missing id: {}", e)))?;
    let email: Option<String> = row.try_get("email").map_err(|e| AppError::internal(format!("missing email: {}", e)))?;
    let display_name: Option<String> = row.try_get("display_name").map_err(|e| AppError::internal(format!("missing display_name: {}", e)))?;
    let role: String = row.try_get("role").map_err(|e| AppError::internal(format!("missing role: {}", e)))?;
    let role_permissions_s: Option<String> = row.try_get("role_permissions").map_err(|e| AppError::internal(format!("missing role_permissions: {}", e)))?;
    let custom_permissions_s: Option<String> = row.try_get("custom_permissions").map_err(|e| AppError::internal(format!("missing custom_permissions: {}", e)))?;
    let created_at_s: String = row.try_get("created_at").map_err(|e| AppError::internal(format!("missing created_at: {}", e)))?;
    let updated_at_s: String = row.try_get("updated_at").map_err(|e| AppError::internal(format!("missing updated_at: {}", e)))?;

    let role_permissions: Option<Vec<ModuleGrant>> = decode_opt_document("role_permissions", role_permissions_s)?;
    let custom_permissions: Option<CustomPermissions> = decode_opt_document("custom_permissions", custom_permissions_s)?;

    Ok(UserRecord {
        id,
        email,
        display_name,
        role,
        role_permissions,
        custom_permissions,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}

pub fn role_override_from_row(row: &SqliteRow) -> Result<RoleOverride, AppError> {
    let role: String = row.try_get("role").map_err(|e| AppError::internal(format!("missing role: {}", e)))?;
    let modules_s: String = row.try_get("modules").map_err(|e| AppError::internal(format!("missing modules: {}", e)))?;
    let updated_by: String = row.try_get("updated_by").map_err(|e| AppError::internal(format!("missing updated_by: {}", e)))?;
    let updated_at_s: String = row.try_get("updated_at").map_err(|e| AppError::internal(format!("missing updated_at: {}", e)))?;

    let modules: Vec<ModuleGrant> = decode_document("modules", &modules_s)?;

    Ok(RoleOverride {
        role,
        modules,
        updated_by,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}

/// Serializes a document for storage in a TEXT column.
pub fn encode_document<T: serde::Serialize>(column: &str, value: &T) -> Result<String, AppError> {
    serde_json::to_string(value)
        .map_err(|e| AppError::internal(format!("failed to encode {}: {}", column, e)))
}
