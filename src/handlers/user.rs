//! User handlers
//!
//! User CRUD and password change. A change to a user's role list pushes the
//! new permission snapshot to that user.

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;

use super::{fetch_page, require};
use crate::entity::user::{self, UserResponse, UserStatus};
use crate::entity::{join_list, now_ts, split_list};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::routes::{ApiResponse, IdQuery, PageQuery, PageResult};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 6;

/// Create user request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub user_code: String,
    pub user_name: String,
    pub password: String,
    pub email: Option<String>,
    /// Comma-joined role names
    pub role_name: Option<String>,
    /// Comma-joined department names
    pub department_name: Option<String>,
    pub status: Option<i32>,
}

/// Update user request; absent fields are left unchanged
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub id: i64,
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub role_name: Option<String>,
    pub department_name: Option<String>,
    pub status: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl ChangePasswordRequest {
    fn validate(&self) -> AppResult<()> {
        require("oldPassword", &self.old_password)?;
        check_password(&self.new_password)?;
        if self.new_password != self.confirm_password {
            return Err(AppError::Validation("passwords do not match".to_string()));
        }
        Ok(())
    }
}

fn check_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Canonical comma-joined column value; None when nothing is given.
fn normalize_list(raw: Option<&str>) -> Option<String> {
    let entries = split_list(raw.unwrap_or_default());
    if entries.is_empty() {
        None
    } else {
        Some(join_list(&entries))
    }
}

fn hash_password(password: &str) -> AppResult<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

/// POST /api/user/create
pub async fn create_user(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    require("userCode", &req.user_code)?;
    require("userName", &req.user_name)?;
    check_password(&req.password)?;
    let user_code = req.user_code.trim().to_string();

    let existing = user::Entity::find()
        .filter(user::Column::UserCode.eq(&user_code))
        .one(&*db)
        .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest(format!("user {} already exists", user_code)));
    }

    let model = user::ActiveModel {
        user_code: Set(user_code),
        user_name: Set(req.user_name.trim().to_string()),
        password: Set(hash_password(&req.password)?),
        email: Set(req.email.filter(|e| !e.trim().is_empty())),
        role_name: Set(normalize_list(req.role_name.as_deref())),
        department_name: Set(normalize_list(req.department_name.as_deref())),
        status: Set(req.status.unwrap_or(UserStatus::Active.into())),
        created_by: Set(Some(current.user_code.clone())),
        created_at: Set(now_ts()),
        ..Default::default()
    };
    let created = model.insert(&*db).await?;

    tracing::info!("User {} created by {}", created.user_code, current.user_code);
    Ok(Json(ApiResponse::success(created.into())))
}

/// GET /api/user/list
pub async fn list_users(
    Extension(db): Extension<DbConn>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<ApiResponse<PageResult<UserResponse>>>> {
    let mut select = user::Entity::find().order_by_desc(user::Column::CreatedAt);
    if let Some(pattern) = query.like_pattern() {
        select = select.filter(
            Condition::any()
                .add(user::Column::UserCode.like(&pattern))
                .add(user::Column::UserName.like(&pattern))
                .add(user::Column::Email.like(&pattern)),
        );
    }

    let page = fetch_page(&*db, select, &query).await?;
    Ok(Json(ApiResponse::success(page.map(UserResponse::from))))
}

/// PUT /api/user/update
pub async fn update_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let existing = user::Entity::find_by_id(req.id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("user not found")?;

    let old_roles = existing.role_names();
    let mut model: user::ActiveModel = existing.into();

    if let Some(name) = req.user_name {
        require("userName", &name)?;
        model.user_name = Set(name.trim().to_string());
    }
    if let Some(email) = req.email {
        model.email = Set(Some(email).filter(|e| !e.trim().is_empty()));
    }
    if let Some(roles) = req.role_name.as_deref() {
        model.role_name = Set(normalize_list(Some(roles)));
    }
    if let Some(departments) = req.department_name.as_deref() {
        model.department_name = Set(normalize_list(Some(departments)));
    }
    if let Some(status) = req.status {
        model.status = Set(status);
    }
    model.updated_by = Set(Some(current.user_code.clone()));
    model.updated_at = Set(Some(now_ts()));

    let updated = model.update(state.db.as_ref()).await?;

    if updated.role_names() != old_roles {
        tracing::info!("Roles of {} changed, pushing permissions", updated.user_code);
        state
            .notify_permission_change(std::slice::from_ref(&updated.user_code))
            .await;
    }

    Ok(Json(ApiResponse::success(updated.into())))
}

/// DELETE /api/user/delete
pub async fn delete_user(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<()>>> {
    if query.id == current.id {
        return Err(AppError::BadRequest("cannot delete yourself".to_string()));
    }

    let existing = user::Entity::find_by_id(query.id)
        .one(&*db)
        .await?
        .ok_or_not_found("user not found")?;
    user::Entity::delete_by_id(existing.id).exec(&*db).await?;

    tracing::info!("User {} deleted by {}", existing.user_code, current.user_code);
    Ok(Json(ApiResponse::success_msg("success")))
}

/// GET /api/user/get
pub async fn get_user(
    Extension(db): Extension<DbConn>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let found = user::Entity::find_by_id(query.id)
        .one(&*db)
        .await?
        .ok_or_not_found("user not found")?;
    Ok(Json(ApiResponse::success(found.into())))
}

/// POST /api/user/change-password
pub async fn change_password(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    req.validate()?;

    let db_user = user::Entity::find_by_id(current.id)
        .one(&*db)
        .await?
        .ok_or_not_found("user not found")?;

    if !bcrypt::verify(&req.old_password, &db_user.password).unwrap_or(false) {
        return Err(AppError::BadRequest("old password is incorrect".to_string()));
    }
    if req.old_password == req.new_password {
        return Err(AppError::BadRequest("new password must differ from the old one".to_string()));
    }

    let mut model: user::ActiveModel = db_user.into();
    model.password = Set(hash_password(&req.new_password)?);
    model.updated_by = Set(Some(current.user_code.clone()));
    model.updated_at = Set(Some(now_ts()));
    model.update(&*db).await?;

    tracing::info!("Password changed for {}", current.user_code);
    Ok(Json(ApiResponse::success_msg("success")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(old: &str, new: &str, confirm: &str) -> ChangePasswordRequest {
        ChangePasswordRequest {
            old_password: old.to_string(),
            new_password: new.to_string(),
            confirm_password: confirm.to_string(),
        }
    }

    #[test]
    fn test_change_password_validation() {
        assert!(change("old-secret", "new-secret", "new-secret").validate().is_ok());
        assert!(change("", "new-secret", "new-secret").validate().is_err());
        assert!(change("old-secret", "short", "short").validate().is_err());
        assert!(change("old-secret", "new-secret", "other-secret").validate().is_err());
    }

    #[test]
    fn test_normalize_list() {
        assert_eq!(normalize_list(Some(" admin ,pm, ")), Some("admin,pm".to_string()));
        assert_eq!(normalize_list(Some("")), None);
        assert_eq!(normalize_list(None), None);
    }

    #[test]
    fn test_password_hash_verifies() {
        let hash = bcrypt::hash("secret1", 4).unwrap();
        assert!(bcrypt::verify("secret1", &hash).unwrap());
        assert!(!bcrypt::verify("secret2", &hash).unwrap());
    }
}
