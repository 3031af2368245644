//! User entity
//!
//! Table: ts_user. A user may hold several roles, stored comma-joined in
//! `role_name`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    /// Disabled, cannot log in
    Disabled = 0,
    /// Normal
    Active = 1,
}

impl From<i32> for UserStatus {
    fn from(value: i32) -> Self {
        match value {
            1 => UserStatus::Active,
            _ => UserStatus::Disabled,
        }
    }
}

impl From<UserStatus> for i32 {
    fn from(status: UserStatus) -> Self {
        status as i32
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ts_user")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Login identity (unique)
    #[sea_orm(column_type = "String(Some(64))", unique)]
    pub user_code: String,

    #[sea_orm(column_type = "String(Some(64))")]
    pub user_name: String,

    /// bcrypt hash
    #[sea_orm(column_type = "String(Some(128))")]
    #[serde(skip_serializing)]
    pub password: String,

    #[sea_orm(column_type = "String(Some(128))", nullable)]
    pub email: Option<String>,

    /// Comma-joined role names
    #[sea_orm(column_type = "String(Some(255))", nullable)]
    pub role_name: Option<String>,

    /// Comma-joined department names
    #[sea_orm(column_type = "String(Some(255))", nullable)]
    pub department_name: Option<String>,

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

impl Model {
    pub fn role_names(&self) -> Vec<String> {
        self.role_name
            .as_deref()
            .map(super::split_list)
            .unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        UserStatus::from(self.status) == UserStatus::Active
    }
}

/// User response (without password)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub user_code: String,
    pub user_name: String,
    pub email: Option<String>,
    pub role_name: Option<String>,
    /// `role_name` split into entries
    pub roles: Vec<String>,
    pub department_name: Option<String>,
    pub status: i32,
    pub created_at: i64,
}

impl From<Model> for UserResponse {
    fn from(model: Model) -> Self {
        let roles = model.role_names();
        Self {
            id: model.id,
            user_code: model.user_code,
            user_name: model.user_name,
            email: model.email,
            role_name: model.role_name,
            roles,
            department_name: model.department_name,
            status: model.status,
            created_at: model.created_at,
        }
    }
}
