//! Persistence ports consumed by the permission engine
//!
//! Implemented over SeaORM in [`crate::store`] and by in-memory fakes in tests.

use async_trait::async_trait;

use crate::entity::permission;
use crate::error::AppResult;

/// A user's identity and the role names it holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRoles {
    pub user_code: String,
    pub role_names: Vec<String>,
}

/// A role's project visibility configuration, already split into entries.
/// Empty when the role has no data scope configured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleScope {
    pub name: String,
    pub data_scope: Vec<String>,
}

/// Permission node table.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Enabled menu nodes ordered by `(sort, created_at)` ascending.
    async fn list_enabled_menus(&self) -> AppResult<Vec<permission::Model>>;

    /// All nodes in the same order, regardless of status or type.
    async fn list_all(&self) -> AppResult<Vec<permission::Model>>;
}

/// Role to permission-code join table.
#[async_trait]
pub trait RolePermissionStore: Send + Sync {
    async fn permission_codes(&self, role_name: &str) -> AppResult<Vec<String>>;
}

/// Role table.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_role(&self, role_name: &str) -> AppResult<Option<RoleScope>>;
}

/// User table.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, user_code: &str) -> AppResult<Option<UserRoles>>;
}
