//! Role entity
//!
//! Table: ts_role. `data_scope` is a comma-joined list of project codes or
//! the `ALL` sentinel.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ts_role")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Role name (unique identity, referenced by users and role_permission)
    #[sea_orm(column_type = "String(Some(64))", unique)]
    pub name: String,

    #[sea_orm(column_type = "String(Some(255))")]
    pub description: String,

    /// Project visibility: comma-joined project codes or "ALL"
    #[sea_orm(column_type = "Text", nullable)]
    pub data_scope: Option<String>,

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
    /// Configured data scope entries, empty when none is set.
    pub fn data_scope_list(&self) -> Vec<String> {
        self.data_scope
            .as_deref()
            .map(super::split_list)
            .unwrap_or_default()
    }
}
