//! Project member handlers
//!
//! Membership is managed on projects the caller can see. A user is a member
//! at most once per project.

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::project::{find_visible_by_code, with_details, ProjectResponse};
use super::require;
use crate::entity::{now_ts, project, project_member, user};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::routes::{ApiResponse, IdQuery};
use crate::state::AppState;

/// Most users accepted by one batch-add call
const MAX_BATCH: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub project_code: String,
    pub user_code: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAddMembersRequest {
    pub project_code: String,
    pub user_codes: Vec<String>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberFailure {
    pub user_code: String,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAddResult {
    pub success_count: usize,
    pub failed_count: usize,
    pub failures: Vec<MemberFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberListQuery {
    pub project_code: String,
}

/// Member row with the user's display name and email
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    #[serde(flatten)]
    pub member: project_member::Model,
    pub user_name: Option<String>,
    pub email: Option<String>,
}

/// Insert one membership after checking the user and duplicates.
async fn add_member<C: ConnectionTrait>(
    db: &C,
    project_code: &str,
    user_code: &str,
    role: Option<&str>,
    added_by: &str,
) -> AppResult<project_member::Model> {
    let user_code = user_code.trim();
    require("userCode", user_code)?;

    let found = user::Entity::find()
        .filter(user::Column::UserCode.eq(user_code))
        .one(db)
        .await?;
    if found.is_none() {
        return Err(AppError::NotFound(format!("user {} not found", user_code)));
    }

    let existing = project_member::Entity::find()
        .filter(project_member::Column::ProjectCode.eq(project_code))
        .filter(project_member::Column::UserCode.eq(user_code))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest(format!(
            "user {} is already a member of {}",
            user_code, project_code
        )));
    }

    let now = now_ts();
    let model = project_member::ActiveModel {
        project_code: Set(project_code.to_string()),
        user_code: Set(user_code.to_string()),
        role: Set(role.map(str::trim).filter(|r| !r.is_empty()).map(str::to_string)),
        join_date: Set(now),
        created_by: Set(Some(added_by.to_string())),
        created_at: Set(now),
        ..Default::default()
    };
    Ok(model.insert(db).await?)
}

/// Add each user in turn, collecting per-user failures.
async fn add_members<C: ConnectionTrait>(
    db: &C,
    project_code: &str,
    user_codes: &[String],
    role: Option<&str>,
    added_by: &str,
) -> AppResult<BatchAddResult> {
    let mut result = BatchAddResult::default();
    for user_code in user_codes {
        match add_member(db, project_code, user_code, role, added_by).await {
            Ok(_) => result.success_count += 1,
            Err(err @ (AppError::Database(_) | AppError::Internal(_))) => return Err(err),
            Err(err) => {
                result.failed_count += 1;
                result.failures.push(MemberFailure {
                    user_code: user_code.clone(),
                    reason: err.detail(),
                });
            }
        }
    }
    Ok(result)
}

/// POST /api/project/member/add
pub async fn add_project_member(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<AddMemberRequest>,
) -> AppResult<Json<ApiResponse<project_member::Model>>> {
    require("projectCode", &req.project_code)?;
    let project = find_visible_by_code(&state, &current, &req.project_code).await?;

    let created = add_member(
        state.db.as_ref(),
        &project.project_code,
        &req.user_code,
        req.role.as_deref(),
        &current.user_code,
    )
    .await?;

    tracing::info!(
        "User {} added to project {} by {}",
        created.user_code,
        created.project_code,
        current.user_code
    );
    Ok(Json(ApiResponse::success(created)))
}

/// POST /api/project/member/batch-add
pub async fn batch_add_project_members(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<BatchAddMembersRequest>,
) -> AppResult<Json<ApiResponse<BatchAddResult>>> {
    require("projectCode", &req.project_code)?;
    if req.user_codes.is_empty() {
        return Err(AppError::Validation("userCodes is required".to_string()));
    }
    if req.user_codes.len() > MAX_BATCH {
        return Err(AppError::Validation(format!("at most {} users per batch", MAX_BATCH)));
    }
    let project = find_visible_by_code(&state, &current, &req.project_code).await?;

    let result = add_members(
        state.db.as_ref(),
        &project.project_code,
        &req.user_codes,
        req.role.as_deref(),
        &current.user_code,
    )
    .await?;

    tracing::info!(
        "Batch add to project {} by {}: {} added, {} failed",
        project.project_code,
        current.user_code,
        result.success_count,
        result.failed_count
    );
    Ok(Json(ApiResponse::success(result)))
}

/// DELETE /api/project/member/remove
pub async fn remove_project_member(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<()>>> {
    let member = project_member::Entity::find_by_id(query.id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("project member not found")?;
    find_visible_by_code(&state, &current, &member.project_code).await?;

    project_member::Entity::delete_by_id(member.id)
        .exec(state.db.as_ref())
        .await?;

    tracing::info!(
        "User {} removed from project {} by {}",
        member.user_code,
        member.project_code,
        current.user_code
    );
    Ok(Json(ApiResponse::success_msg("success")))
}

/// GET /api/project/member/list
pub async fn list_project_members(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<MemberListQuery>,
) -> AppResult<Json<ApiResponse<Vec<MemberResponse>>>> {
    require("projectCode", &query.project_code)?;
    let project = find_visible_by_code(&state, &current, &query.project_code).await?;

    let members = project_member::Entity::find()
        .filter(project_member::Column::ProjectCode.eq(project.project_code.as_str()))
        .order_by_asc(project_member::Column::JoinDate)
        .all(state.db.as_ref())
        .await?;

    let users: HashMap<String, user::Model> = if members.is_empty() {
        HashMap::new()
    } else {
        user::Entity::find()
            .filter(user::Column::UserCode.is_in(members.iter().map(|m| m.user_code.as_str())))
            .all(state.db.as_ref())
            .await?
            .into_iter()
            .map(|u| (u.user_code.clone(), u))
            .collect()
    };

    let records = members
        .into_iter()
        .map(|member| {
            let user = users.get(&member.user_code);
            MemberResponse {
                user_name: user.map(|u| u.user_name.clone()),
                email: user.and_then(|u| u.email.clone()),
                member,
            }
        })
        .collect();
    Ok(Json(ApiResponse::success(records)))
}

/// Projects the user manages or is a member of
fn my_projects_condition(user_code: &str, member_of: Vec<String>) -> Condition {
    Condition::any()
        .add(project::Column::ManagerUserCode.eq(user_code))
        .add_option(
            (!member_of.is_empty()).then(|| project::Column::ProjectCode.is_in(member_of)),
        )
}

/// GET /api/project/my-projects
pub async fn my_projects(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<ProjectResponse>>>> {
    let member_of: Vec<String> = project_member::Entity::find()
        .filter(project_member::Column::UserCode.eq(current.user_code.as_str()))
        .all(state.db.as_ref())
        .await?
        .into_iter()
        .map(|m| m.project_code)
        .collect();

    let projects = project::Entity::find()
        .filter(my_projects_condition(&current.user_code, member_of))
        .order_by_desc(project::Column::CreatedAt)
        .all(state.db.as_ref())
        .await?;

    Ok(Json(ApiResponse::success(with_details(state.db.as_ref(), projects).await?)))
}
