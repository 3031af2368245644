//! SeaORM implementation of the permission engine ports

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;

use crate::entity::{permission, role, role_permission, user};
use crate::error::AppResult;
use crate::permission::{
    PermissionStore, RolePermissionStore, RoleScope, RoleStore, UserRoles, UserStore,
};

/// Store backed by the shared database connection pool.
#[derive(Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

/// Tree order: `sort` then creation time, both ascending.
fn ordered() -> sea_orm::Select<permission::Entity> {
    permission::Entity::find()
        .order_by_asc(permission::Column::Sort)
        .order_by_asc(permission::Column::CreatedAt)
}

#[async_trait]
impl PermissionStore for SeaOrmStore {
    async fn list_enabled_menus(&self) -> AppResult<Vec<permission::Model>> {
        let menus = ordered()
            .filter(permission::Column::Status.eq(permission::STATUS_ENABLED))
            .filter(permission::Column::Kind.eq(permission::TYPE_MENU))
            .all(self.db.as_ref())
            .await?;
        Ok(menus)
    }

    async fn list_all(&self) -> AppResult<Vec<permission::Model>> {
        Ok(ordered().all(self.db.as_ref()).await?)
    }
}

#[async_trait]
impl RolePermissionStore for SeaOrmStore {
    async fn permission_codes(&self, role_name: &str) -> AppResult<Vec<String>> {
        let rows = role_permission::Entity::find()
            .filter(role_permission::Column::RoleName.eq(role_name))
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(|r| r.permission_code).collect())
    }
}

#[async_trait]
impl RoleStore for SeaOrmStore {
    async fn find_role(&self, role_name: &str) -> AppResult<Option<RoleScope>> {
        let found = role::Entity::find()
            .filter(role::Column::Name.eq(role_name))
            .one(self.db.as_ref())
            .await?;
        Ok(found.map(|r| RoleScope {
            data_scope: r.data_scope_list(),
            name: r.name,
        }))
    }
}

#[async_trait]
impl UserStore for SeaOrmStore {
    async fn find_user(&self, user_code: &str) -> AppResult<Option<UserRoles>> {
        let found = user::Entity::find()
            .filter(user::Column::UserCode.eq(user_code))
            .one(self.db.as_ref())
            .await?;
        Ok(found.map(|u| UserRoles {
            role_names: u.role_names(),
            user_code: u.user_code,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, Transaction};

    fn role_row(name: &str, data_scope: Option<&str>) -> role::Model {
        role::Model {
            id: 1,
            name: name.to_string(),
            description: String::new(),
            data_scope: data_scope.map(str::to_string),
            created_by: None,
            created_at: 0,
            updated_by: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_enabled_menus_query() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<permission::Model>::new()])
            .into_connection();
        let store = SeaOrmStore::new(Arc::new(db));

        assert!(store.list_enabled_menus().await.unwrap().is_empty());

        let db = Arc::try_unwrap(store.db).ok().unwrap();
        assert_eq!(
            db.into_transaction_log(),
            vec![Transaction::from_sql_and_values(
                DatabaseBackend::Postgres,
                r#"SELECT "ts_permission"."id", "ts_permission"."name", "ts_permission"."menu_name", "ts_permission"."code", "ts_permission"."module", "ts_permission"."parent_code", "ts_permission"."type", "ts_permission"."path", "ts_permission"."icon", "ts_permission"."component", "ts_permission"."sort", "ts_permission"."description", "ts_permission"."status", "ts_permission"."created_by", "ts_permission"."created_at", "ts_permission"."updated_by", "ts_permission"."updated_at" FROM "ts_permission" WHERE "ts_permission"."status" = $1 AND "ts_permission"."type" = $2 ORDER BY "ts_permission"."sort" ASC, "ts_permission"."created_at" ASC"#,
                [permission::STATUS_ENABLED.into(), permission::TYPE_MENU.into()],
            )]
        );
    }

    #[tokio::test]
    async fn test_find_role_splits_data_scope() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![role_row("pm", Some(" P1, P2 ,"))]])
            .into_connection();
        let store = SeaOrmStore::new(Arc::new(db));

        let scope = store.find_role("pm").await.unwrap().unwrap();
        assert_eq!(scope.name, "pm");
        assert_eq!(scope.data_scope, vec!["P1", "P2"]);
    }

    #[tokio::test]
    async fn test_find_user_missing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<user::Model>::new()])
            .into_connection();
        let store = SeaOrmStore::new(Arc::new(db));

        assert!(store.find_user("ghost").await.unwrap().is_none());
    }
}
