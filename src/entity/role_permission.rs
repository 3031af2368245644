//! RolePermission entity - role to permission join rows
//!
//! Table: ts_role_permission

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ts_role_permission")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "String(Some(64))")]
    pub role_name: String,

    #[sea_orm(column_type = "String(Some(128))")]
    pub permission_code: String,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub created_by: Option<String>,

    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Build an insertable join row.
pub fn new_grant(role_name: &str, permission_code: &str, created_by: Option<&str>) -> ActiveModel {
    use sea_orm::Set;
    ActiveModel {
        role_name: Set(role_name.to_string()),
        permission_code: Set(permission_code.to_string()),
        created_by: Set(created_by.map(str::to_string)),
        created_at: Set(super::now_ts()),
        ..Default::default()
    }
}
