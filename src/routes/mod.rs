use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json},
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers;
use crate::middleware::auth_layer;
use crate::state::AppState;
use crate::ws;

pub mod health;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: StatusCode::OK.as_u16(),
            message: "success".to_string(),
            data: Some(data),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl ApiResponse<()> {
    pub fn success_msg(message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: StatusCode::OK.as_u16(),
            message: message.into(),
            data: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: status.as_u16(),
            message: message.into(),
            data: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// One page of a listing
#[derive(Debug, Serialize)]
pub struct PageResult<T: Serialize> {
    pub records: Vec<T>,
    pub total: u64,
    pub current: u64,
    pub size: u64,
    pub pages: u64,
}

impl<T: Serialize> PageResult<T> {
    pub fn new(records: Vec<T>, total: u64, current: u64, size: u64) -> Self {
        let pages = if size == 0 { 0 } else { total.div_ceil(size) };
        Self {
            records,
            total,
            current,
            size,
            pages,
        }
    }

    /// Convert the records, keeping the paging fields.
    pub fn map<U: Serialize>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            records: self.records.into_iter().map(f).collect(),
            total: self.total,
            current: self.current,
            size: self.size,
            pages: self.pages,
        }
    }
}

const MAX_PAGE_SIZE: u64 = 100;

fn default_current() -> u64 {
    1
}

fn default_size() -> u64 {
    10
}

/// `?current=&size=&searchKey=` shared by every list endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default = "default_current")]
    pub current: u64,
    #[serde(default = "default_size")]
    pub size: u64,
    pub search_key: Option<String>,
}

impl PageQuery {
    /// 1-based page number, at least 1
    pub fn current(&self) -> u64 {
        self.current.max(1)
    }

    pub fn size(&self) -> u64 {
        self.size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Trimmed search text, None when blank
    pub fn search(&self) -> Option<&str> {
        self.search_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// `%term%` pattern for LIKE filters
    pub fn like_pattern(&self) -> Option<String> {
        self.search().map(|s| format!("%{}%", s))
    }
}

/// `?id=` for get/delete endpoints
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: i64,
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth routes
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/profile", get(handlers::auth::profile))
        // Permission routes
        .route("/permission/create", post(handlers::permission::create_permission))
        .route("/permission/list", get(handlers::permission::list_permissions))
        .route("/permission/update", put(handlers::permission::update_permission))
        .route("/permission/delete", delete(handlers::permission::delete_permission))
        .route("/permission/get", get(handlers::permission::get_permission))
        .route("/permission/tree", get(handlers::permission::permission_tree))
        .route("/permission/subtree", get(handlers::permission::permission_subtree))
        .route("/permission/user-menu", get(handlers::permission::user_menu))
        // Role routes
        .route("/role/create", post(handlers::role::create_role))
        .route("/role/list", get(handlers::role::list_roles))
        .route("/role/update", put(handlers::role::update_role))
        .route("/role/delete", delete(handlers::role::delete_role))
        .route("/role/get", get(handlers::role::get_role))
        .route("/role/permissions/:role_name", get(handlers::role::role_permissions))
        // User routes
        .route("/user/create", post(handlers::user::create_user))
        .route("/user/list", get(handlers::user::list_users))
        .route("/user/update", put(handlers::user::update_user))
        .route("/user/delete", delete(handlers::user::delete_user))
        .route("/user/get", get(handlers::user::get_user))
        .route("/user/change-password", post(handlers::user::change_password))
        // Project routes
        .route("/project/create", post(handlers::project::create_project))
        .route("/project/list", get(handlers::project::list_projects))
        .route("/project/get", get(handlers::project::get_project))
        .route("/project/update", put(handlers::project::update_project))
        .route("/project/delete", delete(handlers::project::delete_project))
        .route("/project/my-projects", get(handlers::project_member::my_projects))
        // Project member routes
        .route("/project/member/add", post(handlers::project_member::add_project_member))
        .route("/project/member/batch-add", post(handlers::project_member::batch_add_project_members))
        .route("/project/member/remove", delete(handlers::project_member::remove_project_member))
        .route("/project/member/list", get(handlers::project_member::list_project_members))
        // Department routes
        .route("/department/create", post(handlers::department::create_department))
        .route("/department/list", get(handlers::department::list_departments))
        .route("/department/update", put(handlers::department::update_department))
        .route("/department/delete", delete(handlers::department::delete_department))
        .route("/department/get", get(handlers::department::get_department))
        // Timesheet routes
        .route("/timesheet/create", post(handlers::timesheet::create_timesheet))
        .route("/timesheet/batch-create", post(handlers::timesheet::batch_create_timesheets))
        .route("/timesheet/update", put(handlers::timesheet::update_timesheet))
        .route("/timesheet/delete", delete(handlers::timesheet::delete_timesheet))
        .route("/timesheet/submit", post(handlers::timesheet::submit_timesheet))
        .route("/timesheet/batch-submit", post(handlers::timesheet::batch_submit_timesheets))
        .route("/timesheet/withdraw", post(handlers::timesheet::withdraw_timesheet))
        .route("/timesheet/review", post(handlers::timesheet::review_timesheet))
        .route("/timesheet/batch-review", post(handlers::timesheet::batch_review_timesheets))
        .route("/timesheet/list", get(handlers::timesheet::list_timesheets))
        .route("/timesheet/my-timesheets", get(handlers::timesheet::my_timesheets))
        .route("/timesheet/pending-review", get(handlers::timesheet::pending_review))
        .route(
            "/timesheet/project-manager-timesheets",
            get(handlers::timesheet::project_manager_timesheets),
        )
        .route("/timesheet/detail", get(handlers::timesheet::timesheet_detail))
        .route("/timesheet/statistics", get(handlers::timesheet::timesheet_statistics))
        // WebSocket
        .route("/ws", get(ws::serve_ws));

    Router::new()
        .nest("/api", api_routes)
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Fallback handler for 404
pub async fn fallback() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error(StatusCode::NOT_FOUND, "Not Found")),
    )
}
