//! Permission handlers
//!
//! CRUD over permission nodes plus the tree views built by the permission
//! engine.

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;

use super::{fetch_page, require};
use crate::entity::{now_ts, permission, role_permission};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::permission::PermissionTree;
use crate::routes::{ApiResponse, IdQuery, PageQuery, PageResult};
use crate::state::AppState;

/// Create / update request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    /// Required on update
    pub id: Option<i64>,
    pub name: String,
    pub menu_name: Option<String>,
    pub code: String,
    pub module: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_status")]
    pub status: i32,
    pub parent_code: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub path: Option<String>,
    pub icon: Option<String>,
    pub component: Option<String>,
    #[serde(default)]
    pub sort: i32,
}

fn default_status() -> i32 {
    permission::STATUS_ENABLED
}

impl PermissionRequest {
    fn validate(&self) -> AppResult<()> {
        require("name", &self.name)?;
        require("code", &self.code)?;
        require("module", &self.module)?;
        if self.parent_code.as_deref() == Some(self.code.as_str()) {
            return Err(AppError::Validation("a permission cannot be its own parent".to_string()));
        }
        Ok(())
    }

    /// Copy the editable fields onto an active model.
    fn apply(self, model: &mut permission::ActiveModel) {
        model.name = Set(self.name);
        model.menu_name = Set(self.menu_name);
        model.code = Set(self.code.trim().to_string());
        model.module = Set(self.module);
        model.description = Set(self.description);
        model.status = Set(self.status);
        model.parent_code = Set(self.parent_code.filter(|p| !p.trim().is_empty()));
        model.kind = Set(self.kind);
        model.path = Set(self.path);
        model.icon = Set(self.icon);
        model.component = Set(self.component);
        model.sort = Set(self.sort);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtreeQuery {
    pub parent_code: String,
}

async fn code_taken(db: &DbConn, code: &str) -> AppResult<bool> {
    let found = permission::Entity::find()
        .filter(permission::Column::Code.eq(code.trim()))
        .one(&**db)
        .await?;
    Ok(found.is_some())
}

/// POST /api/permission/create
pub async fn create_permission(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<PermissionRequest>,
) -> AppResult<Json<ApiResponse<permission::Model>>> {
    req.validate()?;

    if code_taken(&db, &req.code).await? {
        return Err(AppError::BadRequest(format!("permission code {} already exists", req.code)));
    }

    let mut model = permission::ActiveModel {
        created_by: Set(Some(user.user_code.clone())),
        created_at: Set(now_ts()),
        ..Default::default()
    };
    req.apply(&mut model);
    let created = model.insert(&*db).await?;

    tracing::info!("Permission {} created by {}", created.code, user.user_code);
    Ok(Json(ApiResponse::success(created)))
}

/// GET /api/permission/list
pub async fn list_permissions(
    Extension(db): Extension<DbConn>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<ApiResponse<PageResult<permission::Model>>>> {
    let mut select = permission::Entity::find().order_by_desc(permission::Column::CreatedAt);
    if let Some(pattern) = query.like_pattern() {
        select = select.filter(
            Condition::any()
                .add(permission::Column::Name.like(&pattern))
                .add(permission::Column::Code.like(&pattern)),
        );
    }

    Ok(Json(ApiResponse::success(fetch_page(&*db, select, &query).await?)))
}

/// PUT /api/permission/update
///
/// The code is the node's identity and cannot change.
pub async fn update_permission(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<PermissionRequest>,
) -> AppResult<Json<ApiResponse<permission::Model>>> {
    let id = req
        .id
        .ok_or_else(|| AppError::BadRequest("id is required".to_string()))?;
    req.validate()?;

    let existing = permission::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("permission not found")?;

    // Children and grants reference the code
    if existing.code != req.code.trim() {
        return Err(AppError::BadRequest("permission code cannot be changed".to_string()));
    }

    let mut model: permission::ActiveModel = existing.into();
    req.apply(&mut model);
    model.updated_by = Set(Some(user.user_code.clone()));
    model.updated_at = Set(Some(now_ts()));
    let updated = model.update(&*db).await?;

    Ok(Json(ApiResponse::success(updated)))
}

/// DELETE /api/permission/delete
///
/// Grants of the deleted code are removed with it.
pub async fn delete_permission(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<()>>> {
    let existing = permission::Entity::find_by_id(query.id)
        .one(&*db)
        .await?
        .ok_or_not_found("permission not found")?;

    let code = existing.code.clone();
    let id = existing.id;
    db.transaction::<_, (), sea_orm::DbErr>(|txn| {
        Box::pin(async move {
            role_permission::Entity::delete_many()
                .filter(role_permission::Column::PermissionCode.eq(code))
                .exec(txn)
                .await?;
            permission::Entity::delete_by_id(id).exec(txn).await?;
            Ok(())
        })
    })
    .await?;

    tracing::info!("Permission {} deleted by {}", existing.code, user.user_code);
    Ok(Json(ApiResponse::success_msg("success")))
}

/// GET /api/permission/get
pub async fn get_permission(
    Extension(db): Extension<DbConn>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<permission::Model>>> {
    let found = permission::Entity::find_by_id(query.id)
        .one(&*db)
        .await?
        .ok_or_not_found("permission not found")?;
    Ok(Json(ApiResponse::success(found)))
}

/// GET /api/permission/tree
pub async fn permission_tree(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<PermissionTree>>>> {
    Ok(Json(ApiResponse::success(state.permissions.permission_tree().await?)))
}

/// GET /api/permission/subtree?parentCode=
pub async fn permission_subtree(
    State(state): State<AppState>,
    Query(query): Query<SubtreeQuery>,
) -> AppResult<Json<ApiResponse<Vec<PermissionTree>>>> {
    require("parentCode", &query.parent_code)?;
    let tree = state.permissions.permission_subtree(query.parent_code.trim()).await?;
    Ok(Json(ApiResponse::success(tree)))
}

/// GET /api/permission/user-menu
pub async fn user_menu(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<PermissionTree>>>> {
    let codes = state.permissions.user_all_permissions(&user.user_code).await?;
    let tree = state.permissions.user_permission_tree(&codes).await?;
    Ok(Json(ApiResponse::success(tree)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn admin() -> CurrentUser {
        CurrentUser {
            id: 1,
            user_code: "admin".to_string(),
            user_name: "Admin".to_string(),
            role_names: vec!["admin".to_string()],
        }
    }

    fn node(id: i64, code: &str) -> permission::Model {
        permission::Model {
            id,
            name: code.to_string(),
            menu_name: None,
            code: code.to_string(),
            module: "system".to_string(),
            description: String::new(),
            status: permission::STATUS_ENABLED,
            parent_code: None,
            kind: Some(permission::TYPE_MENU.to_string()),
            path: None,
            icon: None,
            component: None,
            sort: 0,
            created_by: None,
            created_at: 0,
            updated_by: None,
            updated_at: None,
        }
    }

    fn transaction_log(db: Arc<DatabaseConnection>) -> Vec<String> {
        Arc::try_unwrap(db)
            .map(|db| db.into_transaction_log())
            .unwrap_or_default()
            .iter()
            .map(|t| format!("{:?}", t))
            .collect()
    }

    fn request(json: &str) -> PermissionRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_request_defaults() {
        let req = request(r#"{"name":"Users","code":"system:user","module":"system","type":"menu"}"#);
        assert_eq!(req.status, permission::STATUS_ENABLED);
        assert_eq!(req.sort, 0);
        assert_eq!(req.kind.as_deref(), Some("menu"));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let blank = request(r#"{"name":"","code":"x","module":"m"}"#);
        assert!(matches!(blank.validate(), Err(AppError::Validation(_))));

        let own_parent = request(r#"{"name":"n","code":"x","module":"m","parentCode":"x"}"#);
        assert!(matches!(own_parent.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_apply_normalizes_blank_parent() {
        let req = request(r#"{"name":"n","code":" x ","module":"m","parentCode":"  "}"#);
        let mut model = <permission::ActiveModel as Default>::default();
        req.apply(&mut model);
        assert_eq!(model.parent_code, Set(None));
        assert_eq!(model.code, Set("x".to_string()));
    }

    #[tokio::test]
    async fn test_code_change_rejected() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![node(3, "system:user")]])
                .into_connection(),
        );

        let req = request(r#"{"id":3,"name":"Users","code":"system:member","module":"system"}"#);
        let result = update_permission(Extension(DbConn(db.clone())), Extension(admin()), Json(req)).await;
        assert!(matches!(result, Err(AppError::BadRequest(m)) if m.contains("cannot be changed")));

        // only the lookup ran
        let log = transaction_log(db);
        assert_eq!(log.len(), 1);
        assert!(!log[0].contains("UPDATE"));
    }

    #[tokio::test]
    async fn test_delete_removes_grants_in_one_transaction() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![node(3, "system:user")]])
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 2,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                ])
                .into_connection(),
        );

        let result = delete_permission(
            Extension(DbConn(db.clone())),
            Extension(admin()),
            Query(IdQuery { id: 3 }),
        )
        .await;
        assert!(result.is_ok());

        let log = transaction_log(db);
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].matches("DELETE").count(), 2);
        assert!(log[1].contains("ts_role_permission"));
    }
}
