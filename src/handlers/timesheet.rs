//! Timesheet handlers
//!
//! Users log hours against projects they belong to, then submit the entries
//! to the project manager for review. Only drafts can be edited or deleted,
//! and only pending entries can be withdrawn or reviewed.

use axum::{extract::Query, response::Json, Extension};
use chrono::NaiveDate;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Select, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{fetch_page, require};
use crate::entity::project::{self, ProjectStatus};
use crate::entity::timesheet::{self, TimesheetStatus};
use crate::entity::{now_ts, project_member, user};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::routes::{ApiResponse, IdQuery, PageQuery, PageResult};

const MIN_HOURS: f64 = 0.5;
const MAX_HOURS: f64 = 24.0;

/// Most entries accepted by one batch call
const MAX_BATCH: usize = 50;

/// Statuses that block a second entry for the same user, project and day
const BLOCKING: [TimesheetStatus; 3] = [
    TimesheetStatus::Draft,
    TimesheetStatus::Pending,
    TimesheetStatus::Approved,
];

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimesheetRequest {
    pub project_code: String,
    /// `YYYY-MM-DD`
    pub work_date: NaiveDate,
    pub hours: f64,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchCreateRequest {
    pub timesheets: Vec<CreateTimesheetRequest>,
}

#[derive(Debug, Serialize)]
pub struct BatchItemError {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateResult {
    pub success_count: usize,
    pub failed_count: usize,
    pub errors: Vec<BatchItemError>,
}

/// Draft edit; absent fields keep their value
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTimesheetRequest {
    pub id: i64,
    pub project_code: Option<String>,
    pub work_date: Option<NaiveDate>,
    pub hours: Option<f64>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub id: i64,
    /// 3 approves, 4 rejects
    pub status: i32,
    pub review_comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReviewRequest {
    pub ids: Vec<i64>,
    pub status: i32,
    pub review_comment: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateResult {
    pub updated_count: u64,
}

/// Entry with display names and a readable status
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetResponse {
    #[serde(flatten)]
    pub timesheet: timesheet::Model,
    pub user_name: Option<String>,
    pub project_name: Option<String>,
    pub reviewer_user_name: Option<String>,
    pub status_text: &'static str,
}

/// Filters shared by the listing and statistics endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetQuery {
    pub current: Option<u64>,
    pub size: Option<u64>,
    pub user_code: Option<String>,
    pub project_code: Option<String>,
    pub status: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl TimesheetQuery {
    fn page(&self) -> PageQuery {
        PageQuery {
            current: self.current.unwrap_or(1),
            size: self.size.unwrap_or(10),
            search_key: None,
        }
    }

    fn condition(&self) -> Condition {
        Condition::all()
            .add_option(non_blank(&self.user_code).map(|c| timesheet::Column::UserCode.eq(c)))
            .add_option(non_blank(&self.project_code).map(|c| timesheet::Column::ProjectCode.eq(c)))
            .add_option(self.status.map(|s| timesheet::Column::Status.eq(s)))
            .add_option(self.start_date.map(|d| timesheet::Column::WorkDate.gte(d)))
            .add_option(self.end_date.map(|d| timesheet::Column::WorkDate.lte(d)))
    }
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectHours {
    pub project_code: String,
    pub project_name: Option<String>,
    pub hours: f64,
    pub records: u64,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct StatusCounts {
    pub draft: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetStatistics {
    /// Approved hours only
    pub total_hours: f64,
    pub total_records: u64,
    pub project_stats: Vec<ProjectHours>,
    pub status_stats: StatusCounts,
}

/// Fold approved `(project, hours)` rows and raw status values into the
/// statistics payload. Projects are ordered by code.
fn summarize(
    approved: &[(String, f64)],
    statuses: &[i32],
    project_names: &HashMap<String, String>,
) -> TimesheetStatistics {
    let mut per_project: BTreeMap<&str, (f64, u64)> = BTreeMap::new();
    for (code, hours) in approved {
        let entry = per_project.entry(code.as_str()).or_default();
        entry.0 += hours;
        entry.1 += 1;
    }

    let mut status_stats = StatusCounts::default();
    for status in statuses.iter().filter_map(|s| TimesheetStatus::from_i32(*s)) {
        match status {
            TimesheetStatus::Draft => status_stats.draft += 1,
            TimesheetStatus::Pending => status_stats.pending += 1,
            TimesheetStatus::Approved => status_stats.approved += 1,
            TimesheetStatus::Rejected => status_stats.rejected += 1,
        }
    }

    TimesheetStatistics {
        total_hours: approved.iter().map(|(_, h)| h).sum(),
        total_records: approved.len() as u64,
        project_stats: per_project
            .into_iter()
            .map(|(code, (hours, records))| ProjectHours {
                project_code: code.to_string(),
                project_name: project_names.get(code).cloned(),
                hours,
                records,
            })
            .collect(),
        status_stats,
    }
}

fn validate_hours(hours: f64) -> AppResult<()> {
    if !(MIN_HOURS..=MAX_HOURS).contains(&hours) {
        return Err(AppError::Validation(format!(
            "hours must be between {} and {}",
            MIN_HOURS, MAX_HOURS
        )));
    }
    Ok(())
}

fn validate_work_date(work_date: NaiveDate, today: NaiveDate) -> AppResult<()> {
    if work_date > today {
        return Err(AppError::Validation("workDate cannot be in the future".to_string()));
    }
    Ok(())
}

fn ensure_owner(entry: &timesheet::Model, user_code: &str) -> AppResult<()> {
    if entry.user_code != user_code {
        return Err(AppError::Forbidden(format!(
            "timesheet {} belongs to another user",
            entry.timesheet_code
        )));
    }
    Ok(())
}

fn ensure_status(entry: &timesheet::Model, expected: TimesheetStatus, action: &str) -> AppResult<()> {
    if entry.status() != Some(expected) {
        return Err(AppError::BadRequest(format!(
            "only {} timesheets can be {} ({} is {})",
            expected.label(),
            action,
            entry.timesheet_code,
            entry.status().map(TimesheetStatus::label).unwrap_or("unknown")
        )));
    }
    Ok(())
}

fn check_submit(entry: &timesheet::Model, user_code: &str) -> AppResult<()> {
    ensure_owner(entry, user_code)?;
    ensure_status(entry, TimesheetStatus::Draft, "submitted")
}

/// A pending entry may only be reviewed by its project's manager.
fn check_review(entry: &timesheet::Model, manager: Option<&str>, reviewer: &str) -> AppResult<()> {
    ensure_status(entry, TimesheetStatus::Pending, "reviewed")?;
    if manager != Some(reviewer) {
        return Err(AppError::Forbidden(format!(
            "only the manager of {} can review {}",
            entry.project_code, entry.timesheet_code
        )));
    }
    Ok(())
}

fn review_decision(status: i32) -> AppResult<TimesheetStatus> {
    match TimesheetStatus::from_i32(status) {
        Some(s @ (TimesheetStatus::Approved | TimesheetStatus::Rejected)) => Ok(s),
        _ => Err(AppError::Validation(format!(
            "review status must be {} or {}",
            i32::from(TimesheetStatus::Approved),
            i32::from(TimesheetStatus::Rejected)
        ))),
    }
}

fn check_batch_size(ids: &[i64]) -> AppResult<()> {
    if ids.is_empty() {
        return Err(AppError::Validation("ids is required".to_string()));
    }
    if ids.len() > MAX_BATCH {
        return Err(AppError::Validation(format!("at most {} timesheets per batch", MAX_BATCH)));
    }
    Ok(())
}

/// Project that accepts new hours: it exists and is in progress.
async fn open_project<C: ConnectionTrait>(db: &C, project_code: &str) -> AppResult<project::Model> {
    let found = project::Entity::find()
        .filter(project::Column::ProjectCode.eq(project_code))
        .one(db)
        .await?
        .ok_or_not_found(format!("project {} not found", project_code))?;
    if found.status != i32::from(ProjectStatus::InProgress) {
        return Err(AppError::BadRequest(format!("project {} is not in progress", project_code)));
    }
    Ok(found)
}

/// The manager, or a user with a member row.
async fn ensure_member<C: ConnectionTrait>(
    db: &C,
    project: &project::Model,
    user_code: &str,
) -> AppResult<()> {
    if project.manager_user_code == user_code {
        return Ok(());
    }
    let member = project_member::Entity::find()
        .filter(project_member::Column::ProjectCode.eq(project.project_code.as_str()))
        .filter(project_member::Column::UserCode.eq(user_code))
        .one(db)
        .await?;
    if member.is_none() {
        return Err(AppError::Forbidden(format!(
            "user {} is not a member of project {}",
            user_code, project.project_code
        )));
    }
    Ok(())
}

async fn ensure_no_duplicate<C: ConnectionTrait>(
    db: &C,
    user_code: &str,
    project_code: &str,
    work_date: NaiveDate,
    exclude_id: Option<i64>,
) -> AppResult<()> {
    let existing = timesheet::Entity::find()
        .filter(timesheet::Column::UserCode.eq(user_code))
        .filter(timesheet::Column::ProjectCode.eq(project_code))
        .filter(timesheet::Column::WorkDate.eq(work_date))
        .filter(timesheet::Column::Status.is_in(BLOCKING.map(i32::from)))
        .apply_if(exclude_id, |q, id| q.filter(timesheet::Column::Id.ne(id)))
        .one(db)
        .await?;
    if let Some(entry) = existing {
        return Err(AppError::Conflict(format!(
            "timesheet {} already covers {} on {}",
            entry.timesheet_code, project_code, work_date
        )));
    }
    Ok(())
}

/// Next `TS-YYYYMMDD-NNNNN` code for the day.
async fn next_code<C: ConnectionTrait>(db: &C, day: NaiveDate) -> AppResult<String> {
    let prefix = format!("TS-{}-", day.format("%Y%m%d"));
    let taken = timesheet::Entity::find()
        .filter(timesheet::Column::TimesheetCode.starts_with(&prefix))
        .count(db)
        .await?;
    Ok(format!("{}{:05}", prefix, taken + 1))
}

async fn create_entry<C: ConnectionTrait>(
    db: &C,
    user_code: &str,
    req: &CreateTimesheetRequest,
    today: NaiveDate,
) -> AppResult<timesheet::Model> {
    let project_code = req.project_code.trim();
    require("projectCode", project_code)?;
    require("description", &req.description)?;
    validate_hours(req.hours)?;
    validate_work_date(req.work_date, today)?;

    let project = open_project(db, project_code).await?;
    ensure_member(db, &project, user_code).await?;
    ensure_no_duplicate(db, user_code, project_code, req.work_date, None).await?;

    let model = timesheet::ActiveModel {
        timesheet_code: Set(next_code(db, today).await?),
        user_code: Set(user_code.to_string()),
        project_code: Set(project_code.to_string()),
        work_date: Set(req.work_date),
        hours: Set(req.hours),
        description: Set(req.description.trim().to_string()),
        status: Set(TimesheetStatus::Draft.into()),
        created_by: Set(Some(user_code.to_string())),
        created_at: Set(now_ts()),
        ..Default::default()
    };
    Ok(model.insert(db).await?)
}

async fn load<C: ConnectionTrait>(db: &C, id: i64) -> AppResult<timesheet::Model> {
    timesheet::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_not_found(format!("timesheet {} not found", id))
}

/// Load every id or fail naming the missing ones.
async fn load_all<C: ConnectionTrait>(db: &C, ids: &[i64]) -> AppResult<Vec<timesheet::Model>> {
    let wanted: HashSet<i64> = ids.iter().copied().collect();
    let found = timesheet::Entity::find()
        .filter(timesheet::Column::Id.is_in(wanted.iter().copied()))
        .all(db)
        .await?;

    let present: HashSet<i64> = found.iter().map(|t| t.id).collect();
    let mut missing: Vec<i64> = wanted.difference(&present).copied().collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(AppError::NotFound(format!("timesheets not found: {:?}", missing)));
    }
    Ok(found)
}

/// Attach user, reviewer and project names with one query each.
async fn with_names<C: ConnectionTrait>(
    db: &C,
    rows: Vec<timesheet::Model>,
) -> AppResult<Vec<TimesheetResponse>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let user_codes: HashSet<&str> = rows
        .iter()
        .flat_map(|t| std::iter::once(t.user_code.as_str()).chain(t.reviewer_user_code.as_deref()))
        .collect();
    let users: HashMap<String, String> = user::Entity::find()
        .filter(user::Column::UserCode.is_in(user_codes))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.user_code, u.user_name))
        .collect();

    let project_codes: HashSet<&str> = rows.iter().map(|t| t.project_code.as_str()).collect();
    let projects = project_names(db, project_codes).await?;

    Ok(rows
        .into_iter()
        .map(|t| TimesheetResponse {
            user_name: users.get(&t.user_code).cloned(),
            project_name: projects.get(&t.project_code).cloned(),
            reviewer_user_name: t
                .reviewer_user_code
                .as_ref()
                .and_then(|c| users.get(c))
                .cloned(),
            status_text: t.status().map(TimesheetStatus::label).unwrap_or("unknown"),
            timesheet: t,
        })
        .collect())
}

async fn project_names<'a, C: ConnectionTrait>(
    db: &C,
    codes: impl IntoIterator<Item = &'a str>,
) -> AppResult<HashMap<String, String>> {
    Ok(project::Entity::find()
        .filter(project::Column::ProjectCode.is_in(codes))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.project_code, p.project_name))
        .collect())
}

/// Codes of the projects the user manages
async fn managed_project_codes<C: ConnectionTrait>(db: &C, user_code: &str) -> AppResult<Vec<String>> {
    Ok(project::Entity::find()
        .filter(project::Column::ManagerUserCode.eq(user_code))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.project_code)
        .collect())
}

async fn named_page<C: ConnectionTrait>(
    db: &C,
    select: Select<timesheet::Entity>,
    page: &PageQuery,
) -> AppResult<PageResult<TimesheetResponse>> {
    let PageResult {
        records,
        total,
        current,
        size,
        ..
    } = fetch_page(db, select, page).await?;
    let records = with_names(db, records).await?;
    Ok(PageResult::new(records, total, current, size))
}

fn empty_page(page: &PageQuery) -> PageResult<TimesheetResponse> {
    PageResult::new(Vec::new(), 0, page.current(), page.size())
}

/// POST /api/timesheet/create
pub async fn create_timesheet(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateTimesheetRequest>,
) -> AppResult<Json<ApiResponse<timesheet::Model>>> {
    let created = create_entry(&*db, &current.user_code, &req, today()).await?;

    tracing::info!(
        "Timesheet {} created by {} for {} on {}",
        created.timesheet_code,
        current.user_code,
        created.project_code,
        created.work_date
    );
    Ok(Json(ApiResponse::success(created)))
}

/// POST /api/timesheet/batch-create
///
/// Each entry is created on its own; failures are reported by index.
pub async fn batch_create_timesheets(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<BatchCreateRequest>,
) -> AppResult<Json<ApiResponse<BatchCreateResult>>> {
    if req.timesheets.is_empty() {
        return Err(AppError::Validation("timesheets is required".to_string()));
    }
    if req.timesheets.len() > MAX_BATCH {
        return Err(AppError::Validation(format!("at most {} timesheets per batch", MAX_BATCH)));
    }

    let today = today();
    let mut result = BatchCreateResult::default();
    for (index, entry) in req.timesheets.iter().enumerate() {
        match create_entry(&*db, &current.user_code, entry, today).await {
            Ok(_) => result.success_count += 1,
            Err(err @ (AppError::Database(_) | AppError::Internal(_))) => return Err(err),
            Err(err) => {
                result.failed_count += 1;
                result.errors.push(BatchItemError {
                    index,
                    error: err.detail(),
                });
            }
        }
    }

    tracing::info!(
        "Batch create by {}: {} created, {} failed",
        current.user_code,
        result.success_count,
        result.failed_count
    );
    Ok(Json(ApiResponse::success(result)))
}

/// PUT /api/timesheet/update
pub async fn update_timesheet(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateTimesheetRequest>,
) -> AppResult<Json<ApiResponse<timesheet::Model>>> {
    let existing = load(&*db, req.id).await?;
    ensure_owner(&existing, &current.user_code)?;
    ensure_status(&existing, TimesheetStatus::Draft, "edited")?;

    if let Some(hours) = req.hours {
        validate_hours(hours)?;
    }
    if let Some(description) = &req.description {
        require("description", description)?;
    }
    if let Some(work_date) = req.work_date {
        validate_work_date(work_date, today())?;
    }

    let project_code = non_blank(&req.project_code)
        .unwrap_or(existing.project_code.as_str())
        .to_string();
    let work_date = req.work_date.unwrap_or(existing.work_date);
    if project_code != existing.project_code {
        let project = open_project(&*db, &project_code).await?;
        ensure_member(&*db, &project, &current.user_code).await?;
    }
    if project_code != existing.project_code || work_date != existing.work_date {
        ensure_no_duplicate(&*db, &current.user_code, &project_code, work_date, Some(existing.id))
            .await?;
    }

    let mut model: timesheet::ActiveModel = existing.into();
    model.project_code = Set(project_code);
    model.work_date = Set(work_date);
    if let Some(hours) = req.hours {
        model.hours = Set(hours);
    }
    if let Some(description) = req.description {
        model.description = Set(description.trim().to_string());
    }
    model.updated_by = Set(Some(current.user_code.clone()));
    model.updated_at = Set(Some(now_ts()));
    let updated = model.update(&*db).await?;

    Ok(Json(ApiResponse::success(updated)))
}

/// DELETE /api/timesheet/delete
pub async fn delete_timesheet(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<()>>> {
    let existing = load(&*db, query.id).await?;
    ensure_owner(&existing, &current.user_code)?;
    ensure_status(&existing, TimesheetStatus::Draft, "deleted")?;

    timesheet::Entity::delete_by_id(existing.id).exec(&*db).await?;

    tracing::info!("Timesheet {} deleted by {}", existing.timesheet_code, current.user_code);
    Ok(Json(ApiResponse::success_msg("success")))
}

/// POST /api/timesheet/submit
pub async fn submit_timesheet(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<timesheet::Model>>> {
    let existing = load(&*db, query.id).await?;
    check_submit(&existing, &current.user_code)?;

    let now = now_ts();
    let mut model: timesheet::ActiveModel = existing.into();
    model.status = Set(TimesheetStatus::Pending.into());
    model.submit_date = Set(Some(now));
    model.updated_by = Set(Some(current.user_code.clone()));
    model.updated_at = Set(Some(now));
    let updated = model.update(&*db).await?;

    tracing::info!("Timesheet {} submitted by {}", updated.timesheet_code, current.user_code);
    Ok(Json(ApiResponse::success(updated)))
}

/// POST /api/timesheet/batch-submit
///
/// All or nothing: every entry is checked before the single update runs.
pub async fn batch_submit_timesheets(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<IdsRequest>,
) -> AppResult<Json<ApiResponse<BatchUpdateResult>>> {
    check_batch_size(&req.ids)?;
    let entries = load_all(&*db, &req.ids).await?;
    for entry in &entries {
        check_submit(entry, &current.user_code)?;
    }

    let now = now_ts();
    let updated = timesheet::Entity::update_many()
        .col_expr(timesheet::Column::Status, Expr::value(i32::from(TimesheetStatus::Pending)))
        .col_expr(timesheet::Column::SubmitDate, Expr::value(Some(now)))
        .col_expr(timesheet::Column::UpdatedBy, Expr::value(Some(current.user_code.clone())))
        .col_expr(timesheet::Column::UpdatedAt, Expr::value(Some(now)))
        .filter(timesheet::Column::Id.is_in(entries.iter().map(|t| t.id)))
        .exec(&*db)
        .await?;

    tracing::info!("{} timesheets submitted by {}", updated.rows_affected, current.user_code);
    Ok(Json(ApiResponse::success(BatchUpdateResult {
        updated_count: updated.rows_affected,
    })))
}

/// POST /api/timesheet/withdraw
///
/// Moves a pending entry back to draft.
pub async fn withdraw_timesheet(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<timesheet::Model>>> {
    let existing = load(&*db, query.id).await?;
    ensure_owner(&existing, &current.user_code)?;
    ensure_status(&existing, TimesheetStatus::Pending, "withdrawn")?;

    let mut model: timesheet::ActiveModel = existing.into();
    model.status = Set(TimesheetStatus::Draft.into());
    model.submit_date = Set(None);
    model.updated_by = Set(Some(current.user_code.clone()));
    model.updated_at = Set(Some(now_ts()));
    let updated = model.update(&*db).await?;

    tracing::info!("Timesheet {} withdrawn by {}", updated.timesheet_code, current.user_code);
    Ok(Json(ApiResponse::success(updated)))
}

/// POST /api/timesheet/review
pub async fn review_timesheet(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ReviewRequest>,
) -> AppResult<Json<ApiResponse<timesheet::Model>>> {
    let decision = review_decision(req.status)?;
    let existing = load(&*db, req.id).await?;
    let project = project::Entity::find()
        .filter(project::Column::ProjectCode.eq(existing.project_code.as_str()))
        .one(&*db)
        .await?;
    check_review(
        &existing,
        project.as_ref().map(|p| p.manager_user_code.as_str()),
        &current.user_code,
    )?;

    let now = now_ts();
    let mut model: timesheet::ActiveModel = existing.into();
    model.status = Set(decision.into());
    model.reviewer_user_code = Set(Some(current.user_code.clone()));
    model.review_date = Set(Some(now));
    model.review_comment = Set(req.review_comment);
    model.updated_by = Set(Some(current.user_code.clone()));
    model.updated_at = Set(Some(now));
    let updated = model.update(&*db).await?;

    tracing::info!(
        "Timesheet {} {} by {}",
        updated.timesheet_code,
        decision.label(),
        current.user_code
    );
    Ok(Json(ApiResponse::success(updated)))
}

/// POST /api/timesheet/batch-review
///
/// All or nothing, like batch-submit.
pub async fn batch_review_timesheets(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<BatchReviewRequest>,
) -> AppResult<Json<ApiResponse<BatchUpdateResult>>> {
    let decision = review_decision(req.status)?;
    check_batch_size(&req.ids)?;
    let entries = load_all(&*db, &req.ids).await?;

    let codes: HashSet<&str> = entries.iter().map(|t| t.project_code.as_str()).collect();
    let managers: HashMap<String, String> = project::Entity::find()
        .filter(project::Column::ProjectCode.is_in(codes))
        .all(&*db)
        .await?
        .into_iter()
        .map(|p| (p.project_code, p.manager_user_code))
        .collect();
    for entry in &entries {
        check_review(
            entry,
            managers.get(&entry.project_code).map(String::as_str),
            &current.user_code,
        )?;
    }

    let now = now_ts();
    let updated = timesheet::Entity::update_many()
        .col_expr(timesheet::Column::Status, Expr::value(i32::from(decision)))
        .col_expr(timesheet::Column::ReviewerUserCode, Expr::value(Some(current.user_code.clone())))
        .col_expr(timesheet::Column::ReviewDate, Expr::value(Some(now)))
        .col_expr(timesheet::Column::ReviewComment, Expr::value(req.review_comment))
        .col_expr(timesheet::Column::UpdatedBy, Expr::value(Some(current.user_code.clone())))
        .col_expr(timesheet::Column::UpdatedAt, Expr::value(Some(now)))
        .filter(timesheet::Column::Id.is_in(entries.iter().map(|t| t.id)))
        .exec(&*db)
        .await?;

    tracing::info!(
        "{} timesheets {} by {}",
        updated.rows_affected,
        decision.label(),
        current.user_code
    );
    Ok(Json(ApiResponse::success(BatchUpdateResult {
        updated_count: updated.rows_affected,
    })))
}

/// GET /api/timesheet/list
pub async fn list_timesheets(
    Extension(db): Extension<DbConn>,
    Query(query): Query<TimesheetQuery>,
) -> AppResult<Json<ApiResponse<PageResult<TimesheetResponse>>>> {
    let select = timesheet::Entity::find()
        .filter(query.condition())
        .order_by_desc(timesheet::Column::WorkDate)
        .order_by_desc(timesheet::Column::CreatedAt);
    Ok(Json(ApiResponse::success(named_page(&*db, select, &query.page()).await?)))
}

/// GET /api/timesheet/my-timesheets
pub async fn my_timesheets(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Query(mut query): Query<TimesheetQuery>,
) -> AppResult<Json<ApiResponse<PageResult<TimesheetResponse>>>> {
    query.user_code = Some(current.user_code.clone());
    let select = timesheet::Entity::find()
        .filter(query.condition())
        .order_by_desc(timesheet::Column::WorkDate)
        .order_by_desc(timesheet::Column::CreatedAt);
    Ok(Json(ApiResponse::success(named_page(&*db, select, &query.page()).await?)))
}

/// GET /api/timesheet/pending-review
///
/// Pending entries on projects the caller manages, oldest submission first.
pub async fn pending_review(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Query(mut query): Query<TimesheetQuery>,
) -> AppResult<Json<ApiResponse<PageResult<TimesheetResponse>>>> {
    let page = query.page();
    let managed = managed_project_codes(&*db, &current.user_code).await?;
    if managed.is_empty() {
        return Ok(Json(ApiResponse::success(empty_page(&page))));
    }

    query.status = Some(TimesheetStatus::Pending.into());
    let select = timesheet::Entity::find()
        .filter(query.condition())
        .filter(timesheet::Column::ProjectCode.is_in(managed))
        .order_by_asc(timesheet::Column::SubmitDate);
    Ok(Json(ApiResponse::success(named_page(&*db, select, &page).await?)))
}

/// GET /api/timesheet/project-manager-timesheets
pub async fn project_manager_timesheets(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<TimesheetQuery>,
) -> AppResult<Json<ApiResponse<PageResult<TimesheetResponse>>>> {
    let page = query.page();
    let managed = managed_project_codes(&*db, &current.user_code).await?;
    if managed.is_empty() {
        return Ok(Json(ApiResponse::success(empty_page(&page))));
    }

    let select = timesheet::Entity::find()
        .filter(query.condition())
        .filter(timesheet::Column::ProjectCode.is_in(managed))
        .order_by_desc(timesheet::Column::WorkDate)
        .order_by_desc(timesheet::Column::CreatedAt);
    Ok(Json(ApiResponse::success(named_page(&*db, select, &page).await?)))
}

/// GET /api/timesheet/detail
pub async fn timesheet_detail(
    Extension(db): Extension<DbConn>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<TimesheetResponse>>> {
    let found = load(&*db, query.id).await?;
    let response = with_names(&*db, vec![found])
        .await?
        .pop()
        .ok_or_not_found("timesheet not found")?;
    Ok(Json(ApiResponse::success(response)))
}

/// GET /api/timesheet/statistics
///
/// Hour totals count approved entries under every filter. Status counts
/// honour only the user filter.
pub async fn timesheet_statistics(
    Extension(db): Extension<DbConn>,
    Query(query): Query<TimesheetQuery>,
) -> AppResult<Json<ApiResponse<TimesheetStatistics>>> {
    let approved_filter = TimesheetQuery {
        status: Some(TimesheetStatus::Approved.into()),
        ..query.clone()
    };
    let approved: Vec<(String, f64)> = timesheet::Entity::find()
        .select_only()
        .column(timesheet::Column::ProjectCode)
        .column(timesheet::Column::Hours)
        .filter(approved_filter.condition())
        .into_tuple()
        .all(&*db)
        .await?;

    let status_filter = TimesheetQuery {
        user_code: query.user_code.clone(),
        ..Default::default()
    };
    let statuses: Vec<i32> = timesheet::Entity::find()
        .select_only()
        .column(timesheet::Column::Status)
        .filter(status_filter.condition())
        .into_tuple()
        .all(&*db)
        .await?;

    let names = if approved.is_empty() {
        HashMap::new()
    } else {
        project_names(&*db, approved.iter().map(|(code, _)| code.as_str())).await?
    };

    Ok(Json(ApiResponse::success(summarize(&approved, &statuses, &names))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, Value};
    use std::sync::Arc;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(id: i64, user_code: &str, status: TimesheetStatus) -> timesheet::Model {
        timesheet::Model {
            id,
            timesheet_code: format!("TS-20240510-{:05}", id),
            user_code: user_code.to_string(),
            project_code: "P1".to_string(),
            work_date: day(2024, 5, 10),
            hours: 8.0,
            description: "api work".to_string(),
            status: status.into(),
            submit_date: None,
            reviewer_user_code: None,
            review_date: None,
            review_comment: None,
            created_by: None,
            created_at: 0,
            updated_by: None,
            updated_at: None,
        }
    }

    fn project_row(manager: &str, status: ProjectStatus) -> project::Model {
        project::Model {
            id: 1,
            project_code: "P1".to_string(),
            project_name: "Alpha".to_string(),
            description: None,
            manager_user_code: manager.to_string(),
            director_user_code: "dir".to_string(),
            start_date: None,
            end_date: None,
            status: status.into(),
            created_by: None,
            created_at: 0,
            updated_by: None,
            updated_at: None,
        }
    }

    fn caller(code: &str) -> CurrentUser {
        CurrentUser {
            id: 1,
            user_code: code.to_string(),
            user_name: code.to_uppercase(),
            role_names: Vec::new(),
        }
    }

    fn create_request(json: &str) -> CreateTimesheetRequest {
        serde_json::from_str(json).unwrap()
    }

    fn log_of(db: DatabaseConnection) -> String {
        format!("{:?}", db.into_transaction_log())
    }

    #[test]
    fn test_hours_and_date_limits() {
        assert!(validate_hours(0.5).is_ok());
        assert!(validate_hours(24.0).is_ok());
        assert!(validate_hours(0.25).is_err());
        assert!(validate_hours(24.5).is_err());
        assert!(validate_hours(f64::NAN).is_err());

        let today = day(2024, 5, 10);
        assert!(validate_work_date(today, today).is_ok());
        assert!(matches!(
            validate_work_date(day(2024, 5, 11), today),
            Err(AppError::Validation(m)) if m.contains("future")
        ));
    }

    #[test]
    fn test_state_rules() {
        let draft = entry(1, "u1", TimesheetStatus::Draft);
        assert!(check_submit(&draft, "u1").is_ok());
        assert!(matches!(check_submit(&draft, "u2"), Err(AppError::Forbidden(_))));

        let pending = entry(2, "u1", TimesheetStatus::Pending);
        assert!(matches!(check_submit(&pending, "u1"), Err(AppError::BadRequest(m)) if m.contains("only draft")));

        assert!(check_review(&pending, Some("pm"), "pm").is_ok());
        assert!(matches!(check_review(&pending, Some("pm"), "u1"), Err(AppError::Forbidden(_))));
        assert!(matches!(check_review(&pending, None, "pm"), Err(AppError::Forbidden(_))));
        assert!(matches!(check_review(&draft, Some("pm"), "pm"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_review_decision() {
        assert_eq!(review_decision(3).unwrap(), TimesheetStatus::Approved);
        assert_eq!(review_decision(4).unwrap(), TimesheetStatus::Rejected);
        assert!(review_decision(2).is_err());
        assert!(review_decision(0).is_err());
    }

    #[test]
    fn test_summarize() {
        let approved = vec![
            ("P2".to_string(), 4.0),
            ("P1".to_string(), 8.0),
            ("P2".to_string(), 1.5),
        ];
        let statuses = vec![1, 2, 2, 3, 3, 3, 4, 9];
        let names = HashMap::from([("P1".to_string(), "Alpha".to_string())]);

        let stats = summarize(&approved, &statuses, &names);
        assert_eq!(stats.total_hours, 13.5);
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.project_stats[0].project_code, "P1");
        assert_eq!(stats.project_stats[0].project_name.as_deref(), Some("Alpha"));
        assert_eq!(stats.project_stats[1].hours, 5.5);
        assert_eq!(stats.project_stats[1].records, 2);
        assert_eq!(
            stats.status_stats,
            StatusCounts {
                draft: 1,
                pending: 2,
                approved: 3,
                rejected: 1
            }
        );

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalHours"], 13.5);
        assert_eq!(json["statusStats"]["pending"], 2);
    }

    #[test]
    fn test_query_filters() {
        let query: TimesheetQuery =
            serde_json::from_str(r#"{"userCode":"u1","status":2,"startDate":"2024-05-01","projectCode":" "}"#)
                .unwrap();
        assert_eq!((query.page().current(), query.page().size()), (1, 10));

        let sql = timesheet::Entity::find()
            .filter(query.condition())
            .order_by_desc(timesheet::Column::WorkDate)
            .build(DatabaseBackend::Postgres)
            .to_string();
        assert!(sql.contains(r#""user_code" = 'u1'"#));
        assert!(sql.contains(r#""status" = 2"#));
        assert!(sql.contains(r#""work_date" >= '2024-05-01'"#));
        assert!(!sql.contains("project_code\" ="));
        assert!(sql.contains(r#"ORDER BY "ts_timesheet"."work_date" DESC"#));
    }

    #[tokio::test]
    async fn test_create_assigns_next_code_of_the_day() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![project_row("u1", ProjectStatus::InProgress)]])
            .append_query_results([Vec::<timesheet::Model>::new()])
            .append_query_results([vec![BTreeMap::from([("num_items", Value::BigInt(Some(4)))])]])
            .append_query_results([vec![entry(5, "u1", TimesheetStatus::Draft)]])
            .into_connection();

        let req = create_request(r#"{"projectCode":"P1","workDate":"2024-05-09","hours":8,"description":"api work"}"#);
        let created = create_entry(&db, "u1", &req, day(2024, 5, 10)).await.unwrap();
        assert_eq!(created.status, i32::from(TimesheetStatus::Draft));

        let log = log_of(db);
        assert!(log.contains("TS-20240510-00005"));
        assert!(log.contains("LIKE"));
    }

    #[tokio::test]
    async fn test_create_duplicate_day_conflicts() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![project_row("u1", ProjectStatus::InProgress)]])
            .append_query_results([vec![entry(1, "u1", TimesheetStatus::Pending)]])
            .into_connection();

        let req = create_request(r#"{"projectCode":"P1","workDate":"2024-05-10","hours":2,"description":"fix"}"#);
        let result = create_entry(&db, "u1", &req, day(2024, 5, 10)).await;
        assert!(matches!(result, Err(AppError::Conflict(m)) if m.contains("TS-20240510-00001")));
    }

    #[tokio::test]
    async fn test_create_requires_membership() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![project_row("pm", ProjectStatus::InProgress)]])
            .append_query_results([Vec::<project_member::Model>::new()])
            .into_connection();

        let req = create_request(r#"{"projectCode":"P1","workDate":"2024-05-10","hours":2,"description":"fix"}"#);
        let result = create_entry(&db, "u1", &req, day(2024, 5, 10)).await;
        assert!(matches!(result, Err(AppError::Forbidden(m)) if m.contains("not a member")));
    }

    #[tokio::test]
    async fn test_create_on_closed_project() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![project_row("u1", ProjectStatus::Completed)]])
            .into_connection();

        let req = create_request(r#"{"projectCode":"P1","workDate":"2024-05-10","hours":2,"description":"fix"}"#);
        let result = create_entry(&db, "u1", &req, day(2024, 5, 10)).await;
        assert!(matches!(result, Err(AppError::BadRequest(m)) if m.contains("not in progress")));
    }

    #[tokio::test]
    async fn test_batch_submit_is_all_or_nothing() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![
                    entry(1, "u1", TimesheetStatus::Draft),
                    entry(2, "u1", TimesheetStatus::Approved),
                ]])
                .into_connection(),
        );

        let result = batch_submit_timesheets(
            Extension(DbConn(db.clone())),
            Extension(caller("u1")),
            Json(IdsRequest { ids: vec![1, 2] }),
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(m)) if m.contains("TS-20240510-00002")));

        let log = log_of(Arc::try_unwrap(db).ok().unwrap());
        assert!(!log.contains("UPDATE"));
    }

    #[tokio::test]
    async fn test_batch_review_names_missing_ids() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![entry(1, "u1", TimesheetStatus::Pending)]])
                .into_connection(),
        );

        let req: BatchReviewRequest = serde_json::from_str(r#"{"ids":[1,7],"status":3}"#).unwrap();
        let result = batch_review_timesheets(Extension(DbConn(db)), Extension(caller("pm")), Json(req)).await;
        assert!(matches!(result, Err(AppError::NotFound(m)) if m.contains("[7]")));
    }

    #[tokio::test]
    async fn test_withdraw_needs_pending() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![entry(1, "u1", TimesheetStatus::Approved)]])
                .into_connection(),
        );

        let result = withdraw_timesheet(
            Extension(DbConn(db)),
            Extension(caller("u1")),
            Query(IdQuery { id: 1 }),
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(m)) if m.contains("only pending")));
    }

    #[tokio::test]
    async fn test_names_are_attached() {
        let mut reviewed = entry(1, "u1", TimesheetStatus::Approved);
        reviewed.reviewer_user_code = Some("pm".to_string());
        let users = ["u1", "pm"].map(|code| user::Model {
            id: 1,
            user_code: code.to_string(),
            user_name: code.to_uppercase(),
            password: String::new(),
            email: None,
            role_name: None,
            department_name: None,
            status: 1,
            created_by: None,
            created_at: 0,
            updated_by: None,
            updated_at: None,
        });
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([users.to_vec()])
            .append_query_results([vec![project_row("pm", ProjectStatus::InProgress)]])
            .into_connection();

        let named = with_names(&db, vec![reviewed]).await.unwrap();
        assert_eq!(named[0].user_name.as_deref(), Some("U1"));
        assert_eq!(named[0].reviewer_user_name.as_deref(), Some("PM"));
        assert_eq!(named[0].project_name.as_deref(), Some("Alpha"));

        let json = serde_json::to_value(&named[0]).unwrap();
        assert_eq!(json["statusText"], "approved");
        assert_eq!(json["workDate"], "2024-05-10");
    }
}
