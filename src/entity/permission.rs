//! Permission entity - menu and button permission nodes
//!
//! Table: ts_permission. Nodes form a tree through `parent_code`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Only enabled nodes take part in user menu resolution.
pub const STATUS_ENABLED: i32 = 1;

/// Node type for navigation entries. Anything else is a button gate.
pub const TYPE_MENU: &str = "menu";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ts_permission")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "String(Some(64))")]
    pub name: String,

    /// Menu display key used by the client
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub menu_name: Option<String>,

    /// Globally unique permission code
    #[sea_orm(column_type = "String(Some(128))", unique)]
    pub code: String,

    #[sea_orm(column_type = "String(Some(64))")]
    pub module: String,

    /// Parent node code; None or empty means root level
    #[sea_orm(column_type = "String(Some(128))", nullable)]
    pub parent_code: Option<String>,

    /// "menu" or a button-level type
    #[sea_orm(column_name = "type", column_type = "String(Some(16))", nullable)]
    #[serde(rename = "type")]
    pub kind: Option<String>,

    #[sea_orm(column_type = "String(Some(255))", nullable)]
    pub path: Option<String>,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub icon: Option<String>,

    #[sea_orm(column_type = "String(Some(255))", nullable)]
    pub component: Option<String>,

    /// Ascending order among siblings
    pub sort: i32,

    #[sea_orm(column_type = "String(Some(255))")]
    pub description: String,

    /// 1 = enabled, anything else disabled
    pub status: i32,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub created_by: Option<String>,

    /// Unix seconds, tie-break after `sort`
    pub created_at: i64,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub updated_by: Option<String>,

    pub updated_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parent code with the empty string normalized away.
    pub fn parent(&self) -> Option<&str> {
        self.parent_code.as_deref().filter(|p| !p.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    pub fn is_menu(&self) -> bool {
        self.kind.as_deref() == Some(TYPE_MENU)
    }

    pub fn is_enabled(&self) -> bool {
        self.status == STATUS_ENABLED
    }
}
