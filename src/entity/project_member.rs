//! Project member entity
//!
//! Table: ts_project_member. One row per (project, user) pair. The project
//! manager needs no row to see the project.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ts_project_member")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "String(Some(64))", indexed)]
    pub project_code: String,

    #[sea_orm(column_type = "String(Some(64))", indexed)]
    pub user_code: String,

    /// Role inside the project, e.g. developer or tester
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub role: Option<String>,

    /// Unix seconds
    pub join_date: i64,

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
