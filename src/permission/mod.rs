//! Permission engine
//!
//! Builds menu trees from the flat permission table, narrows them to what a
//! user's roles grant, and resolves the project data scope used by list
//! queries.

pub mod closure;
pub mod ports;
pub mod scope;
pub mod service;
pub mod tree;

pub use closure::close_ancestors;
pub use ports::{PermissionStore, RolePermissionStore, RoleScope, RoleStore, UserRoles, UserStore};
pub use scope::{ProjectScope, SCOPE_ALL};
pub use service::{PermissionService, UserMenu};
pub use tree::{build_tree, PermissionTree};
