//! Timesheet entity
//!
//! Table: ts_timesheet. One entry is the hours a user spent on one project
//! on one day. Entries move draft -> pending -> approved / rejected, and a
//! pending entry can be withdrawn back to draft.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Review state of a timesheet entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimesheetStatus {
    Draft = 1,
    Pending = 2,
    Approved = 3,
    Rejected = 4,
}

impl TimesheetStatus {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(TimesheetStatus::Draft),
            2 => Some(TimesheetStatus::Pending),
            3 => Some(TimesheetStatus::Approved),
            4 => Some(TimesheetStatus::Rejected),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimesheetStatus::Draft => "draft",
            TimesheetStatus::Pending => "pending",
            TimesheetStatus::Approved => "approved",
            TimesheetStatus::Rejected => "rejected",
        }
    }
}

impl From<TimesheetStatus> for i32 {
    fn from(status: TimesheetStatus) -> Self {
        status as i32
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ts_timesheet")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// `TS-YYYYMMDD-NNNNN`
    #[sea_orm(column_type = "String(Some(32))", unique)]
    pub timesheet_code: String,

    #[sea_orm(column_type = "String(Some(64))", indexed)]
    pub user_code: String,

    #[sea_orm(column_type = "String(Some(64))", indexed)]
    pub project_code: String,

    pub work_date: Date,

    pub hours: f64,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    /// See [`TimesheetStatus`]
    #[sea_orm(indexed)]
    pub status: i32,

    /// Unix seconds
    pub submit_date: Option<i64>,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub reviewer_user_code: Option<String>,

    pub review_date: Option<i64>,

    #[sea_orm(column_type = "Text", nullable)]
    pub review_comment: Option<String>,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub created_by: Option<String>,

    pub created_at: i64,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub updated_by: Option<String>,

    pub updated_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn status(&self) -> Option<TimesheetStatus> {
        TimesheetStatus::from_i32(self.status)
    }
}
