pub mod health;
pub mod me;
pub mod rbac;

use crate::app::AppState;
use crate::authz::{Action, AuthzMode, Principal};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;

/// Loads the caller's principal and checks `module:action` against the
/// configured enforcement mode.
///
/// `Off` skips resolution entirely; `Advisory` logs a denial and lets the
/// request through.
pub async fn require_permission(state: &AppState, auth: &AuthUser, module: &str, action: Action) -> AppResult<()> {
    if state.authz_mode == AuthzMode::Off {
        return Ok(());
    }

    let principal = load_principal(state, auth).await?;
    if state.evaluator.can(&principal, module, action).await {
        return Ok(());
    }

    match state.authz_mode {
        AuthzMode::Strict => {
            tracing::debug!(user_id = %auth.user_id, module = %module, action = %action, "denied");
            Err(AppError::forbidden(format!("missing permission {module}:{action}")))
        }
        _ => {
            tracing::warn!(
                user_id = %auth.user_id,
                module = %module,
                action = %action,
                "advisory mode: request would be denied"
            );
            Ok(())
        }
    }
}

async fn load_principal(state: &AppState, auth: &AuthUser) -> AppResult<Principal> {
    match state.permissions.resolve_user(&auth.user_id).await {
        Ok((user, resolution)) => Ok(Principal::new(user.id, user.role).with_permissions(resolution.effective)),
        // No profile document: authenticated but holding nothing.
        Err(AppError::NotFound(_)) => Ok(Principal::new(auth.user_id.clone(), String::new())),
        Err(err) => Err(err),
    }
}
