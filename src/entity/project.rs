//! Project entity
//!
//! Table: ts_project

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Project status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    InProgress = 1,
    Completed = 2,
    Cancelled = 3,
}

impl From<ProjectStatus> for i32 {
    fn from(status: ProjectStatus) -> Self {
        status as i32
    }
}

impl ProjectStatus {
    pub fn is_valid(value: i32) -> bool {
        (ProjectStatus::InProgress as i32..=ProjectStatus::Cancelled as i32).contains(&value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ts_project")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "String(Some(64))", unique)]
    pub project_code: String,

    #[sea_orm(column_type = "String(Some(128))")]
    pub project_name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Project manager user code
    #[sea_orm(column_type = "String(Some(64))")]
    pub manager_user_code: String,

    /// Project director user code
    #[sea_orm(column_type = "String(Some(64))")]
    pub director_user_code: String,

    /// Unix seconds
    pub start_date: Option<i64>,

    pub end_date: Option<i64>,

    /// 1 = in progress, 2 = completed, 3 = cancelled
    pub status: i32,

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
