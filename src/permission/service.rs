//! Permission resolution service
//!
//! Every call re-reads the stores and derives the result from scratch, so
//! role or permission edits are visible on the next request.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use super::closure::close_ancestors;
use super::ports::{PermissionStore, RolePermissionStore, RoleStore, UserRoles, UserStore};
use super::scope::ProjectScope;
use super::tree::{build_tree, PermissionTree};
use crate::error::AppResult;

/// Menu tree and button codes for one user, as handed to clients on login
/// and on every permission push.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMenu {
    pub permissions: Vec<PermissionTree>,
    pub button_permissions: Vec<String>,
}

#[derive(Clone)]
pub struct PermissionService {
    permissions: Arc<dyn PermissionStore>,
    role_permissions: Arc<dyn RolePermissionStore>,
    roles: Arc<dyn RoleStore>,
    users: Arc<dyn UserStore>,
}

impl PermissionService {
    pub fn new(
        permissions: Arc<dyn PermissionStore>,
        role_permissions: Arc<dyn RolePermissionStore>,
        roles: Arc<dyn RoleStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            permissions,
            role_permissions,
            roles,
            users,
        }
    }

    /// Full administrative tree, disabled and button nodes included.
    pub async fn permission_tree(&self) -> AppResult<Vec<PermissionTree>> {
        let all = self.permissions.list_all().await?;
        Ok(build_tree(&all, None))
    }

    /// Administrative tree below `parent_code`.
    pub async fn permission_subtree(&self, parent_code: &str) -> AppResult<Vec<PermissionTree>> {
        let all = self.permissions.list_all().await?;
        Ok(build_tree(&all, Some(parent_code)))
    }

    /// Menu tree for a set of granted codes.
    ///
    /// Only enabled menu nodes are considered. Granted nodes keep their
    /// ancestors even when the ancestors are not granted themselves; codes
    /// that match no enabled menu node are dropped.
    pub async fn user_permission_tree(&self, codes: &[String]) -> AppResult<Vec<PermissionTree>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let menus = self.permissions.list_enabled_menus().await?;
        let granted: HashSet<&str> = codes.iter().map(String::as_str).collect();

        let seeds = menus
            .iter()
            .map(|m| m.code.as_str())
            .filter(|code| granted.contains(code));
        let closed = close_ancestors(seeds, &menus);

        let visible: Vec<_> = menus
            .into_iter()
            .filter(|m| closed.contains(&m.code))
            .collect();

        Ok(build_tree(&visible, None))
    }

    /// Granted codes that are enabled button-level nodes, in node order.
    pub async fn user_button_permissions(&self, codes: &[String]) -> AppResult<Vec<String>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let granted: HashSet<&str> = codes.iter().map(String::as_str).collect();
        let all = self.permissions.list_all().await?;

        Ok(all
            .into_iter()
            .filter(|p| p.is_enabled() && !p.is_menu() && granted.contains(p.code.as_str()))
            .map(|p| p.code)
            .collect())
    }

    /// Union of the permission codes of every role the user holds.
    /// An unknown user or a user without roles has none.
    pub async fn user_all_permissions(&self, user_code: &str) -> AppResult<Vec<String>> {
        match self.users.find_user(user_code).await? {
            Some(user) => self.role_permission_codes(&user).await,
            None => Ok(Vec::new()),
        }
    }

    /// Everything a client needs to render navigation for `user_code`.
    pub async fn user_menu(&self, user_code: &str) -> AppResult<UserMenu> {
        let codes = self.user_all_permissions(user_code).await?;
        let permissions = self.user_permission_tree(&codes).await?;
        let button_permissions = self.user_button_permissions(&codes).await?;
        Ok(UserMenu {
            permissions,
            button_permissions,
        })
    }

    /// Deduplicated codes across `user.role_names`, first-seen order.
    pub async fn role_permission_codes(&self, user: &UserRoles) -> AppResult<Vec<String>> {
        let mut seen = HashSet::new();
        let mut codes = Vec::new();

        for role_name in &user.role_names {
            for code in self.role_permissions.permission_codes(role_name).await? {
                if seen.insert(code.clone()) {
                    codes.push(code);
                }
            }
        }
        Ok(codes)
    }

    /// Project visibility for a user, derived from the data scope of its roles.
    pub async fn resolve_project_scope(&self, user_code: &str) -> AppResult<ProjectScope> {
        let Some(user) = self.users.find_user(user_code).await? else {
            tracing::debug!("Unknown user {} sees no projects", user_code);
            return Ok(ProjectScope::Nothing);
        };

        let mut scopes = Vec::with_capacity(user.role_names.len());
        for role_name in &user.role_names {
            if let Some(role) = self.roles.find_role(role_name).await? {
                if !role.data_scope.is_empty() {
                    scopes.push(role.data_scope);
                }
            }
        }

        Ok(ProjectScope::from_role_scopes(scopes))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    use crate::entity::permission;
    use crate::error::AppError;
    use crate::permission::ports::RoleScope;
    use crate::permission::tree::tests::node;

    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub(crate) nodes: Vec<permission::Model>,
        pub(crate) grants: HashMap<String, Vec<String>>,
        pub(crate) roles: HashMap<String, Vec<String>>,
        pub(crate) users: HashMap<String, Vec<String>>,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl PermissionStore for FakeStore {
        async fn list_enabled_menus(&self) -> AppResult<Vec<permission::Model>> {
            if self.fail {
                return Err(AppError::Database(sea_orm::DbErr::Custom("down".to_string())));
            }
            Ok(self
                .nodes
                .iter()
                .filter(|n| n.is_enabled() && n.is_menu())
                .cloned()
                .collect())
        }

        async fn list_all(&self) -> AppResult<Vec<permission::Model>> {
            Ok(self.nodes.clone())
        }
    }

    #[async_trait]
    impl RolePermissionStore for FakeStore {
        async fn permission_codes(&self, role_name: &str) -> AppResult<Vec<String>> {
            Ok(self.grants.get(role_name).cloned().unwrap_or_default())
        }
    }

    #[async_trait]
    impl RoleStore for FakeStore {
        async fn find_role(&self, role_name: &str) -> AppResult<Option<RoleScope>> {
            Ok(self.roles.get(role_name).map(|scope| RoleScope {
                name: role_name.to_string(),
                data_scope: scope.clone(),
            }))
        }
    }

    #[async_trait]
    impl UserStore for FakeStore {
        async fn find_user(&self, user_code: &str) -> AppResult<Option<UserRoles>> {
            Ok(self.users.get(user_code).map(|roles| UserRoles {
                user_code: user_code.to_string(),
                role_names: roles.clone(),
            }))
        }
    }

    pub(crate) fn service(store: FakeStore) -> PermissionService {
        let store = Arc::new(store);
        PermissionService::new(store.clone(), store.clone(), store.clone(), store)
    }

    pub(crate) fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn button(code: &str, parent: &str) -> permission::Model {
        let mut n = node(code, Some(parent), 0);
        n.kind = Some("button".to_string());
        n
    }

    pub(crate) fn menu_store() -> FakeStore {
        let mut disabled = node("system:audit", Some("system"), 3);
        disabled.status = 0;
        FakeStore {
            nodes: vec![
                node("system", None, 0),
                node("system:user", Some("system"), 0),
                node("system:permission", Some("system"), 1),
                node("project", None, 1),
                node("project:project", Some("project"), 0),
                disabled,
                button("button:user:create", "system:user"),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_granted_leaf_brings_its_parent() {
        let svc = service(menu_store());
        let tree = svc.user_permission_tree(&strings(&["system:user"])).await.unwrap();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].node.code, "system");
        assert_eq!(tree[0].codes(), vec!["system", "system:user"]);
    }

    #[tokio::test]
    async fn test_tree_is_stable_across_calls() {
        let svc = service(menu_store());
        let codes = strings(&["project:project", "system:permission", "system:user"]);
        let first = svc.user_permission_tree(&codes).await.unwrap();
        let second = svc.user_permission_tree(&codes).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].node.code, "system");
        assert_eq!(first[1].node.code, "project");
    }

    #[tokio::test]
    async fn test_disabled_unknown_and_button_codes_are_dropped() {
        let svc = service(menu_store());
        let codes = strings(&["system:audit", "nope", "button:user:create"]);
        assert!(svc.user_permission_tree(&codes).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_codes_give_empty_tree() {
        let svc = service(menu_store());
        assert!(svc.user_permission_tree(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_tree_includes_everything() {
        let svc = service(menu_store());
        let tree = svc.permission_tree().await.unwrap();
        let codes: Vec<&str> = tree.iter().flat_map(|t| t.codes()).collect();
        assert_eq!(codes.len(), 7);
        assert!(codes.contains(&"system:audit"));

        let sub = svc.permission_subtree("system:user").await.unwrap();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub[0].node.code, "button:user:create");
    }

    #[tokio::test]
    async fn test_button_permissions_exclude_menus() {
        let svc = service(menu_store());
        let codes = strings(&["system", "system:user", "button:user:create", "missing"]);
        let buttons = svc.user_button_permissions(&codes).await.unwrap();
        assert_eq!(buttons, vec!["button:user:create"]);
    }

    #[tokio::test]
    async fn test_role_codes_are_deduplicated() {
        let mut store = menu_store();
        store.grants.insert("A".to_string(), strings(&["x", "y"]));
        store.grants.insert("B".to_string(), strings(&["y", "z"]));
        store.users.insert("u1".to_string(), strings(&["A", "B"]));
        let svc = service(store);

        let mut codes = svc.user_all_permissions("u1").await.unwrap();
        codes.sort();
        assert_eq!(codes, vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn test_user_without_roles_has_no_permissions() {
        let mut store = menu_store();
        store.users.insert("u1".to_string(), Vec::new());
        let svc = service(store);

        assert!(svc.user_all_permissions("u1").await.unwrap().is_empty());
        assert!(svc.user_all_permissions("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_menu_combines_tree_and_buttons() {
        let mut store = menu_store();
        store
            .grants
            .insert("staff".to_string(), strings(&["system:user", "button:user:create"]));
        store.users.insert("u1".to_string(), strings(&["staff"]));
        let svc = service(store);

        let menu = svc.user_menu("u1").await.unwrap();
        assert_eq!(menu.permissions[0].codes(), vec!["system", "system:user"]);
        assert_eq!(menu.button_permissions, vec!["button:user:create"]);

        let json = serde_json::to_value(&menu).unwrap();
        assert!(json["buttonPermissions"].is_array());
        assert_eq!(json["permissions"][0]["code"], "system");
    }

    #[tokio::test]
    async fn test_project_scope_resolution() {
        let mut store = FakeStore::default();
        store.roles.insert("admin".to_string(), strings(&["ALL"]));
        store.roles.insert("pm1".to_string(), strings(&["P1", "P2"]));
        store.roles.insert("pm2".to_string(), strings(&["P2", "P3"]));
        store.roles.insert("staff".to_string(), Vec::new());
        store.users.insert("boss".to_string(), strings(&["pm1", "admin"]));
        store.users.insert("pm".to_string(), strings(&["pm1", "pm2"]));
        store.users.insert("dev".to_string(), strings(&["staff", "unknown"]));
        store.users.insert("nobody".to_string(), Vec::new());
        let svc = service(store);

        assert_eq!(svc.resolve_project_scope("boss").await.unwrap(), ProjectScope::All);

        match svc.resolve_project_scope("pm").await.unwrap() {
            ProjectScope::Codes { mut project_codes } => {
                project_codes.sort();
                assert_eq!(project_codes, vec!["P1", "P2", "P3"]);
            }
            other => panic!("unexpected scope {:?}", other),
        }

        assert_eq!(svc.resolve_project_scope("dev").await.unwrap(), ProjectScope::Owned);
        assert_eq!(svc.resolve_project_scope("nobody").await.unwrap(), ProjectScope::Owned);
        assert_eq!(svc.resolve_project_scope("ghost").await.unwrap(), ProjectScope::Nothing);
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let mut store = menu_store();
        store.fail = true;
        let svc = service(store);

        let result = svc.user_permission_tree(&strings(&["system"])).await;
        assert!(matches!(result, Err(AppError::Database(_))));
    }
}
