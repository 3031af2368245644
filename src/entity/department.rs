//! Department entity
//!
//! Table: ts_department. Departments nest through `parent_name`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const STATUS_ENABLED: i32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ts_department")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Unique name, referenced by children and by users
    #[sea_orm(column_type = "String(Some(64))", unique)]
    pub name: String,

    #[sea_orm(column_type = "String(Some(255))")]
    pub description: String,

    /// Parent department name; None at the top level
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub parent_name: Option<String>,

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
