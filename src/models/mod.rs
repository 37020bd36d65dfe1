pub mod rbac;
pub mod role_override;
pub mod user;
