//! Project handlers
//!
//! Every read and write is limited to the projects visible under the
//! caller's data scope.

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::{fetch_page, require};
use crate::entity::project::{self, ProjectStatus};
use crate::entity::{now_ts, project_member, user};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::routes::{ApiResponse, IdQuery, PageQuery, PageResult};
use crate::state::AppState;

/// Create / update request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequest {
    /// Required on update
    pub id: Option<i64>,
    pub project_code: String,
    pub project_name: String,
    pub description: Option<String>,
    pub manager_user_code: String,
    pub director_user_code: String,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub status: Option<i32>,
}

impl ProjectRequest {
    fn validate(&self) -> AppResult<()> {
        require("projectCode", &self.project_code)?;
        require("projectName", &self.project_name)?;
        require("managerUserCode", &self.manager_user_code)?;
        require("directorUserCode", &self.director_user_code)?;

        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(AppError::Validation("startDate is after endDate".to_string()));
            }
        }
        if let Some(status) = self.status {
            if !ProjectStatus::is_valid(status) {
                return Err(AppError::Validation(format!("unknown project status {}", status)));
            }
        }
        Ok(())
    }

    fn apply(self, model: &mut project::ActiveModel) {
        model.project_code = Set(self.project_code.trim().to_string());
        model.project_name = Set(self.project_name.trim().to_string());
        model.description = Set(self.description);
        model.manager_user_code = Set(self.manager_user_code.trim().to_string());
        model.director_user_code = Set(self.director_user_code.trim().to_string());
        model.start_date = Set(self.start_date);
        model.end_date = Set(self.end_date);
        if let Some(status) = self.status {
            model.status = Set(status);
        }
    }
}

/// Project with the display names of its manager and director and the
/// number of member rows
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResponse {
    #[serde(flatten)]
    pub project: project::Model,
    pub manager_user_name: Option<String>,
    pub director_user_name: Option<String>,
    pub member_count: u64,
}

/// Resolve manager and director names with a single user query and member
/// counts with a single member query.
pub(crate) async fn with_details<C: ConnectionTrait>(
    db: &C,
    projects: Vec<project::Model>,
) -> AppResult<Vec<ProjectResponse>> {
    if projects.is_empty() {
        return Ok(Vec::new());
    }

    let user_codes: HashSet<&str> = projects
        .iter()
        .flat_map(|p| [p.manager_user_code.as_str(), p.director_user_code.as_str()])
        .collect();
    let names: HashMap<String, String> = user::Entity::find()
        .filter(user::Column::UserCode.is_in(user_codes))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.user_code, u.user_name))
        .collect();

    let project_codes: HashSet<&str> = projects.iter().map(|p| p.project_code.as_str()).collect();
    let mut counts: HashMap<String, u64> = HashMap::new();
    for member in project_member::Entity::find()
        .filter(project_member::Column::ProjectCode.is_in(project_codes))
        .all(db)
        .await?
    {
        *counts.entry(member.project_code).or_default() += 1;
    }

    Ok(projects
        .into_iter()
        .map(|p| ProjectResponse {
            manager_user_name: names.get(&p.manager_user_code).cloned(),
            director_user_name: names.get(&p.director_user_code).cloned(),
            member_count: counts.get(&p.project_code).copied().unwrap_or(0),
            project: p,
        })
        .collect())
}

async fn user_exists<C: ConnectionTrait>(db: &C, user_code: &str) -> AppResult<bool> {
    let found = user::Entity::find()
        .filter(user::Column::UserCode.eq(user_code.trim()))
        .one(db)
        .await?;
    Ok(found.is_some())
}

/// Data scope condition for the caller.
async fn scope_condition(state: &AppState, current: &CurrentUser) -> AppResult<Condition> {
    let scope = state
        .permissions
        .resolve_project_scope(&current.user_code)
        .await?;
    tracing::debug!("Project scope for {}: {:?}", current.user_code, scope);
    Ok(scope.condition(&current.user_code))
}

/// Load a project by id if the caller may see it.
async fn find_visible(state: &AppState, current: &CurrentUser, id: i64) -> AppResult<project::Model> {
    let scope = scope_condition(state, current).await?;
    project::Entity::find_by_id(id)
        .filter(scope)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("project not found")
}

/// Load a project by code if the caller may see it.
pub(crate) async fn find_visible_by_code(
    state: &AppState,
    current: &CurrentUser,
    project_code: &str,
) -> AppResult<project::Model> {
    let scope = scope_condition(state, current).await?;
    project::Entity::find()
        .filter(project::Column::ProjectCode.eq(project_code.trim()))
        .filter(scope)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found(format!("project {} not found", project_code.trim()))
}

/// Search over project code and name
fn search_condition(query: &PageQuery) -> Option<Condition> {
    query.like_pattern().map(|pattern| {
        Condition::any()
            .add(project::Column::ProjectCode.like(&pattern))
            .add(project::Column::ProjectName.like(&pattern))
    })
}

/// POST /api/project/create
pub async fn create_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ProjectRequest>,
) -> AppResult<Json<ApiResponse<project::Model>>> {
    req.validate()?;

    let existing = project::Entity::find()
        .filter(project::Column::ProjectCode.eq(req.project_code.trim()))
        .one(state.db.as_ref())
        .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest(format!("project {} already exists", req.project_code.trim())));
    }

    if !user_exists(state.db.as_ref(), &req.manager_user_code).await? {
        return Err(AppError::NotFound(format!("manager {} not found", req.manager_user_code.trim())));
    }

    let mut model = project::ActiveModel {
        status: Set(ProjectStatus::InProgress.into()),
        created_by: Set(Some(current.user_code.clone())),
        created_at: Set(now_ts()),
        ..Default::default()
    };
    req.apply(&mut model);
    let created = model.insert(state.db.as_ref()).await?;

    tracing::info!("Project {} created by {}", created.project_code, current.user_code);
    Ok(Json(ApiResponse::success(created)))
}

/// GET /api/project/list
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<ApiResponse<PageResult<ProjectResponse>>>> {
    let scope = state
        .permissions
        .resolve_project_scope(&current.user_code)
        .await?;
    if scope.is_nothing() {
        return Ok(Json(ApiResponse::success(PageResult::new(
            Vec::new(),
            0,
            query.current(),
            query.size(),
        ))));
    }

    let filter = Condition::all()
        .add(scope.condition(&current.user_code))
        .add_option(search_condition(&query));

    let select = project::Entity::find()
        .filter(filter)
        .order_by_desc(project::Column::CreatedAt);
    let page = fetch_page(state.db.as_ref(), select, &query).await?;

    let PageResult {
        records,
        total,
        current: page_no,
        size,
        ..
    } = page;
    let records = with_details(state.db.as_ref(), records).await?;
    Ok(Json(ApiResponse::success(PageResult::new(records, total, page_no, size))))
}

/// GET /api/project/get
pub async fn get_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<ProjectResponse>>> {
    let found = find_visible(&state, &current, query.id).await?;
    let mut named = with_details(state.db.as_ref(), vec![found]).await?;
    let response = named.pop().ok_or_not_found("project not found")?;
    Ok(Json(ApiResponse::success(response)))
}

/// PUT /api/project/update
pub async fn update_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ProjectRequest>,
) -> AppResult<Json<ApiResponse<project::Model>>> {
    let id = req
        .id
        .ok_or_else(|| AppError::BadRequest("id is required".to_string()))?;
    req.validate()?;

    let existing = find_visible(&state, &current, id).await?;

    if existing.project_code != req.project_code.trim() {
        let taken = project::Entity::find()
            .filter(project::Column::ProjectCode.eq(req.project_code.trim()))
            .one(state.db.as_ref())
            .await?;
        if taken.is_some() {
            return Err(AppError::BadRequest(format!("project {} already exists", req.project_code.trim())));
        }
    }
    if existing.manager_user_code != req.manager_user_code.trim()
        && !user_exists(state.db.as_ref(), &req.manager_user_code).await?
    {
        return Err(AppError::NotFound(format!("manager {} not found", req.manager_user_code.trim())));
    }

    let mut model: project::ActiveModel = existing.into();
    req.apply(&mut model);
    model.updated_by = Set(Some(current.user_code.clone()));
    model.updated_at = Set(Some(now_ts()));
    let updated = model.update(state.db.as_ref()).await?;

    Ok(Json(ApiResponse::success(updated)))
}

/// DELETE /api/project/delete
///
/// Member rows of the project are removed with it.
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<()>>> {
    let existing = find_visible(&state, &current, query.id).await?;

    let code = existing.project_code.clone();
    let id = existing.id;
    state
        .db
        .transaction::<_, (), sea_orm::DbErr>(|txn| {
            Box::pin(async move {
                project_member::Entity::delete_many()
                    .filter(project_member::Column::ProjectCode.eq(code))
                    .exec(txn)
                    .await?;
                project::Entity::delete_by_id(id).exec(txn).await?;
                Ok(())
            })
        })
        .await?;

    tracing::info!("Project {} deleted by {}", existing.project_code, current.user_code);
    Ok(Json(ApiResponse::success_msg("success")))
}
