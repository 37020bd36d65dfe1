use async_trait::async_trait;

use super::grant::Action;
use super::principal::Principal;

/// Policy evaluator trait for pluggable route guards
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Check if the principal may perform `action` on `module`
    async fn can(&self, principal: &Principal, module: &str, action: Action) -> bool;
}

/// Default guard policy over the effective permission set
///
/// Evaluation order:
/// 1. exact (module, action) match -> allow
/// 2. `manage` on the module -> allow any action on it
/// 3. deny
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PolicyEvaluator for DefaultPolicyEvaluator {
    async fn can(&self, principal: &Principal, module: &str, action: Action) -> bool {
        if principal.has_permission(module, action) {
            tracing::debug!(
                user_id = %principal.user_id,
                module = %module,
                action = %action,
                "direct permission match"
            );
            return true;
        }

        if principal.has_permission(module, Action::Manage) {
            tracing::debug!(
                user_id = %principal.user_id,
                module = %module,
                action = %action,
                "manage implies action"
            );
            return true;
        }

        tracing::debug!(
            user_id = %principal.user_id,
            role = %principal.role,
            module = %module,
            action = %action,
            "permission denied"
        );
        false
    }
}
