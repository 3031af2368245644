//! Authentication handlers
//!
//! Login, token refresh and the current user's profile

use axum::{extract::State, Extension, Json};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};

use crate::entity::user::{self, UserResponse};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::{issue_token, load_active_user, verify_token, CurrentUser, TokenKind};
use crate::middleware::DbConn;
use crate::permission::UserMenu;
use crate::routes::ApiResponse;
use crate::state::AppState;

/// Login request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_code: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Login response: tokens, profile and the navigation snapshot
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserResponse,
    #[serde(flatten)]
    pub menu: UserMenu,
}

fn token_pair(state: &AppState, user_code: &str) -> AppResult<TokenPair> {
    let jwt = &state.config.jwt;
    Ok(TokenPair {
        access_token: issue_token(jwt, user_code, TokenKind::Access)?,
        refresh_token: issue_token(jwt, user_code, TokenKind::Refresh)?,
        token_type: "Bearer",
        expires_in: jwt.access_ttl_secs,
    })
}

const INVALID_CREDENTIALS: &str = "user code or password error";

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    if req.user_code.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("userCode and password are required".to_string()));
    }

    let found = user::Entity::find()
        .filter(user::Column::UserCode.eq(req.user_code.trim()))
        .one(state.db.as_ref())
        .await?;

    let Some(db_user) = found else {
        tracing::warn!("Login failed: user not found - {}", req.user_code);
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    };

    if !bcrypt::verify(&req.password, &db_user.password).unwrap_or(false) {
        tracing::warn!("Login failed: wrong password - {}", req.user_code);
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    if !db_user.is_active() {
        tracing::warn!("Login failed: user disabled - {}", req.user_code);
        return Err(AppError::Unauthorized("user is disabled".to_string()));
    }

    let tokens = token_pair(&state, &db_user.user_code)?;
    let menu = state.permissions.user_menu(&db_user.user_code).await?;

    tracing::info!("User logged in: {}", db_user.user_code);
    Ok(Json(ApiResponse::success(LoginResponse {
        tokens,
        user: db_user.into(),
        menu,
    })))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<ApiResponse<TokenPair>>> {
    let claims = verify_token(&state.config.jwt, &req.refresh_token, TokenKind::Refresh)?;
    let db_user = load_active_user(state.db.as_ref(), &claims.user_code).await?;

    Ok(Json(ApiResponse::success(token_pair(&state, &db_user.user_code)?)))
}

/// GET /api/auth/profile
pub async fn profile(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let model = user::Entity::find_by_id(current.id)
        .one(&*db)
        .await?
        .ok_or_not_found("user not found")?;

    Ok(Json(ApiResponse::success(model.into())))
}
