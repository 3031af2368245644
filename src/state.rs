use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::Config;
use crate::permission::PermissionService;
use crate::store::SeaOrmStore;
use crate::ws::Hub;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Application configuration
    pub config: Arc<Config>,
    /// Permission engine over the database stores
    pub permissions: PermissionService,
    /// Live WebSocket connections
    pub hub: Arc<Hub>,
}

impl AppState {
    /// Create new application state
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        let db = Arc::new(db);
        let store = Arc::new(SeaOrmStore::new(db.clone()));
        let permissions = PermissionService::new(store.clone(), store.clone(), store.clone(), store);

        Self {
            db,
            config: Arc::new(config),
            permissions,
            hub: Arc::new(Hub::new()),
        }
    }

    /// Push fresh permissions to the given users, if connected.
    pub async fn notify_permission_change(&self, user_codes: &[String]) {
        if user_codes.is_empty() {
            return;
        }
        self.hub
            .push_permissions_to_users(&self.permissions, user_codes)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_notify_offline_users_is_noop() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let state = AppState::new(db, Config::default());

        // no queries queued: any store access would fail the push
        state.notify_permission_change(&["u1".to_string()]).await;
        assert!(!state.hub.is_online("u1"));
    }
}
