//! Department handlers
//!
//! Departments form a tree through their parent's name. The name is the
//! key users and children refer to, so it is fixed once created.

use axum::{extract::Query, response::Json, Extension};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::Deserialize;

use super::{fetch_page, require};
use crate::entity::{department, now_ts};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::routes::{ApiResponse, IdQuery, PageQuery, PageResult};

/// Create / update request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentRequest {
    /// Required on update
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parent_department_name: Option<String>,
    pub status: Option<i32>,
}

impl DepartmentRequest {
    fn validate(&self) -> AppResult<()> {
        require("name", &self.name)?;
        if self.parent() == Some(self.name.trim()) {
            return Err(AppError::Validation("a department cannot be its own parent".to_string()));
        }
        Ok(())
    }

    /// Trimmed parent name, None when blank
    fn parent(&self) -> Option<&str> {
        self.parent_department_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn apply(&self, model: &mut department::ActiveModel) {
        model.description = Set(self.description.trim().to_string());
        model.parent_name = Set(self.parent().map(str::to_string));
        if let Some(status) = self.status {
            model.status = Set(status);
        }
    }
}

async fn find_by_name(db: &DbConn, name: &str) -> AppResult<Option<department::Model>> {
    Ok(department::Entity::find()
        .filter(department::Column::Name.eq(name))
        .one(&**db)
        .await?)
}

async fn require_parent(db: &DbConn, req: &DepartmentRequest) -> AppResult<()> {
    if let Some(parent) = req.parent() {
        if find_by_name(db, parent).await?.is_none() {
            return Err(AppError::NotFound(format!("parent department {} not found", parent)));
        }
    }
    Ok(())
}

/// POST /api/department/create
pub async fn create_department(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<DepartmentRequest>,
) -> AppResult<Json<ApiResponse<department::Model>>> {
    req.validate()?;

    let name = req.name.trim();
    if find_by_name(&db, name).await?.is_some() {
        return Err(AppError::BadRequest(format!("department {} already exists", name)));
    }
    require_parent(&db, &req).await?;

    let mut model = department::ActiveModel {
        name: Set(name.to_string()),
        status: Set(department::STATUS_ENABLED),
        created_by: Set(Some(user.user_code.clone())),
        created_at: Set(now_ts()),
        ..Default::default()
    };
    req.apply(&mut model);
    let created = model.insert(&*db).await?;

    tracing::info!("Department {} created by {}", created.name, user.user_code);
    Ok(Json(ApiResponse::success(created)))
}

/// GET /api/department/list
pub async fn list_departments(
    Extension(db): Extension<DbConn>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<ApiResponse<PageResult<department::Model>>>> {
    let mut select = department::Entity::find().order_by_desc(department::Column::CreatedAt);
    if let Some(pattern) = query.like_pattern() {
        select = select.filter(
            Condition::any()
                .add(department::Column::Name.like(&pattern))
                .add(department::Column::Description.like(&pattern)),
        );
    }

    Ok(Json(ApiResponse::success(fetch_page(&*db, select, &query).await?)))
}

/// PUT /api/department/update
pub async fn update_department(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<DepartmentRequest>,
) -> AppResult<Json<ApiResponse<department::Model>>> {
    let id = req
        .id
        .ok_or_else(|| AppError::BadRequest("id is required".to_string()))?;
    req.validate()?;

    let existing = department::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("department not found")?;
    if existing.name != req.name.trim() {
        return Err(AppError::BadRequest("department name cannot be changed".to_string()));
    }
    require_parent(&db, &req).await?;

    let mut model: department::ActiveModel = existing.into();
    req.apply(&mut model);
    model.updated_by = Set(Some(user.user_code.clone()));
    model.updated_at = Set(Some(now_ts()));
    let updated = model.update(&*db).await?;

    Ok(Json(ApiResponse::success(updated)))
}

/// DELETE /api/department/delete
pub async fn delete_department(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<()>>> {
    let existing = department::Entity::find_by_id(query.id)
        .one(&*db)
        .await?
        .ok_or_not_found("department not found")?;

    let children = department::Entity::find()
        .filter(department::Column::ParentName.eq(existing.name.as_str()))
        .count(&*db)
        .await?;
    if children > 0 {
        return Err(AppError::BadRequest(format!(
            "department {} still has {} sub-departments",
            existing.name, children
        )));
    }

    department::Entity::delete_by_id(existing.id).exec(&*db).await?;

    tracing::info!("Department {} deleted by {}", existing.name, user.user_code);
    Ok(Json(ApiResponse::success_msg("success")))
}

/// GET /api/department/get
pub async fn get_department(
    Extension(db): Extension<DbConn>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<department::Model>>> {
    let found = department::Entity::find_by_id(query.id)
        .one(&*db)
        .await?
        .ok_or_not_found("department not found")?;
    Ok(Json(ApiResponse::success(found)))
}
