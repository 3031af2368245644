//! Entity module - SeaORM entity definitions
//!
//! One module per table. Comma-joined columns are split with [`split_list`]
//! when rows are turned into domain values.

pub mod department;
pub mod permission;
pub mod project;
pub mod project_member;
pub mod role;
pub mod role_permission;
pub mod timesheet;
pub mod user;

/// Split a comma-joined column into trimmed, non-empty entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join entries back into the comma-joined column format.
pub fn join_list<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Current unix timestamp in seconds, used for the audit columns.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
