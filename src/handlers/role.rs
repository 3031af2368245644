//! Role handlers
//!
//! Role CRUD plus the role's permission grants. Grant changes are pushed to
//! the role's connected members.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{fetch_page, require};
use crate::db::ADMIN_ROLE;
use crate::entity::{join_list, now_ts, role, role_permission, split_list, user};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::routes::{ApiResponse, IdQuery, PageQuery, PageResult};
use crate::state::AppState;

/// Create / update request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRequest {
    /// Required on update
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Comma-joined project codes or "ALL"
    pub data_scope: Option<String>,
    /// When present, replaces the role's grants
    pub permission_codes: Option<Vec<String>>,
}

/// Role with its granted codes
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    #[serde(flatten)]
    pub role: role::Model,
    pub permission_codes: Vec<String>,
}

/// Normalized data scope column value; None when nothing is configured.
fn normalize_scope(raw: Option<&str>) -> Option<String> {
    let entries = split_list(raw.unwrap_or_default());
    if entries.is_empty() {
        None
    } else {
        Some(join_list(&entries))
    }
}

/// Trimmed, non-empty, deduplicated codes in request order.
fn normalize_codes(codes: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    codes
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty() && seen.insert(*c))
        .map(str::to_string)
        .collect()
}

async fn replace_grants<C: ConnectionTrait>(
    db: &C,
    role_name: &str,
    codes: &[String],
    created_by: &str,
) -> Result<(), sea_orm::DbErr> {
    role_permission::Entity::delete_many()
        .filter(role_permission::Column::RoleName.eq(role_name))
        .exec(db)
        .await?;

    if !codes.is_empty() {
        role_permission::Entity::insert_many(
            codes
                .iter()
                .map(|code| role_permission::new_grant(role_name, code, Some(created_by))),
        )
        .exec(db)
        .await?;
    }
    Ok(())
}

async fn granted_codes<C: ConnectionTrait>(db: &C, role_name: &str) -> AppResult<Vec<String>> {
    let rows = role_permission::Entity::find()
        .filter(role_permission::Column::RoleName.eq(role_name))
        .order_by_asc(role_permission::Column::Id)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|r| r.permission_code).collect())
}

/// User codes of every user holding `role_name`.
pub(crate) async fn role_members<C: ConnectionTrait>(db: &C, role_name: &str) -> AppResult<Vec<String>> {
    let candidates = user::Entity::find()
        .filter(user::Column::RoleName.contains(role_name))
        .all(db)
        .await?;

    Ok(candidates
        .into_iter()
        .filter(|u| u.role_names().iter().any(|r| r == role_name))
        .map(|u| u.user_code)
        .collect())
}

/// POST /api/role/create
pub async fn create_role(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<RoleRequest>,
) -> AppResult<Json<ApiResponse<RoleResponse>>> {
    require("name", &req.name)?;
    let name = req.name.trim().to_string();

    let existing = role::Entity::find()
        .filter(role::Column::Name.eq(&name))
        .one(&*db)
        .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest(format!("role {} already exists", name)));
    }

    let codes = normalize_codes(req.permission_codes.as_deref().unwrap_or_default());
    let model = role::ActiveModel {
        name: Set(name.clone()),
        description: Set(req.description),
        data_scope: Set(normalize_scope(req.data_scope.as_deref())),
        created_by: Set(Some(current.user_code.clone())),
        created_at: Set(now_ts()),
        ..Default::default()
    };

    let author = current.user_code.clone();
    let grants = codes.clone();
    let created = db
        .transaction::<_, role::Model, sea_orm::DbErr>(|txn| {
            Box::pin(async move {
                let created = model.insert(txn).await?;
                replace_grants(txn, &created.name, &grants, &author).await?;
                Ok(created)
            })
        })
        .await?;

    tracing::info!("Role {} created by {} with {} permissions", name, current.user_code, codes.len());
    Ok(Json(ApiResponse::success(RoleResponse {
        role: created,
        permission_codes: codes,
    })))
}

/// GET /api/role/list
pub async fn list_roles(
    Extension(db): Extension<DbConn>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<ApiResponse<PageResult<role::Model>>>> {
    let mut select = role::Entity::find().order_by_desc(role::Column::CreatedAt);
    if let Some(pattern) = query.like_pattern() {
        select = select.filter(role::Column::Name.like(&pattern));
    }

    Ok(Json(ApiResponse::success(fetch_page(&*db, select, &query).await?)))
}

/// PUT /api/role/update
///
/// The role name is its identity for users and grants and cannot change.
pub async fn update_role(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<RoleRequest>,
) -> AppResult<Json<ApiResponse<RoleResponse>>> {
    let id = req
        .id
        .ok_or_else(|| AppError::BadRequest("id is required".to_string()))?;

    let existing = role::Entity::find_by_id(id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("role not found")?;

    if existing.name != req.name.trim() {
        return Err(AppError::BadRequest("role name cannot be changed".to_string()));
    }

    let role_name = existing.name.clone();
    let new_codes = req.permission_codes.as_deref().map(normalize_codes);

    let mut model: role::ActiveModel = existing.into();
    model.description = Set(req.description);
    // Absent keeps the current scope, an empty string clears it
    if let Some(scope) = req.data_scope.as_deref() {
        model.data_scope = Set(normalize_scope(Some(scope)));
    }
    model.updated_by = Set(Some(current.user_code.clone()));
    model.updated_at = Set(Some(now_ts()));

    let author = current.user_code.clone();
    let grants = new_codes.clone();
    let updated = state
        .db
        .transaction::<_, role::Model, sea_orm::DbErr>(|txn| {
            Box::pin(async move {
                let updated = model.update(txn).await?;
                if let Some(codes) = grants {
                    replace_grants(txn, &updated.name, &codes, &author).await?;
                }
                Ok(updated)
            })
        })
        .await?;

    if new_codes.is_some() {
        let members = role_members(state.db.as_ref(), &role_name).await?;
        tracing::info!("Role {} permissions replaced, notifying {} members", role_name, members.len());
        state.notify_permission_change(&members).await;
    }

    let permission_codes = granted_codes(state.db.as_ref(), &role_name).await?;
    Ok(Json(ApiResponse::success(RoleResponse {
        role: updated,
        permission_codes,
    })))
}

/// DELETE /api/role/delete
///
/// Removes the role and its grants. Members keep the name in their role list
/// but it no longer grants anything.
pub async fn delete_role(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<()>>> {
    let existing = role::Entity::find_by_id(query.id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("role not found")?;

    if existing.name == ADMIN_ROLE {
        return Err(AppError::BadRequest("built-in role cannot be deleted".to_string()));
    }

    let role_name = existing.name.clone();
    let role_id = existing.id;
    let name_for_txn = role_name.clone();
    state
        .db
        .transaction::<_, (), sea_orm::DbErr>(|txn| {
            Box::pin(async move {
                role_permission::Entity::delete_many()
                    .filter(role_permission::Column::RoleName.eq(name_for_txn))
                    .exec(txn)
                    .await?;
                role::Entity::delete_by_id(role_id).exec(txn).await?;
                Ok(())
            })
        })
        .await?;

    let members = role_members(state.db.as_ref(), &role_name).await?;
    state.notify_permission_change(&members).await;

    tracing::info!("Role {} deleted by {}", role_name, current.user_code);
    Ok(Json(ApiResponse::success_msg("success")))
}

/// GET /api/role/get
pub async fn get_role(
    Extension(db): Extension<DbConn>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<RoleResponse>>> {
    let found = role::Entity::find_by_id(query.id)
        .one(&*db)
        .await?
        .ok_or_not_found("role not found")?;
    let permission_codes = granted_codes(&*db, &found.name).await?;

    Ok(Json(ApiResponse::success(RoleResponse {
        role: found,
        permission_codes,
    })))
}

/// GET /api/role/permissions/:role_name
pub async fn role_permissions(
    Extension(db): Extension<DbConn>,
    Path(role_name): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<String>>>> {
    Ok(Json(ApiResponse::success(granted_codes(&*db, &role_name).await?)))
}
