//! Request handlers module

pub mod auth;
pub mod department;
pub mod permission;
pub mod project;
pub mod project_member;
pub mod role;
pub mod timesheet;
pub mod user;

use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait, QuerySelect, Select};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::routes::{PageQuery, PageResult};

/// Run a filtered, ordered select as one page plus the total count.
pub(crate) async fn fetch_page<E, C>(
    db: &C,
    select: Select<E>,
    query: &PageQuery,
) -> AppResult<PageResult<E::Model>>
where
    E: EntityTrait,
    E::Model: Serialize + Send + Sync + 'static,
    C: ConnectionTrait,
{
    let (current, size) = (query.current(), query.size());
    let total = select.clone().count(db).await?;
    let records = select
        .offset(page_offset(current, size))
        .limit(size)
        .all(db)
        .await?;

    Ok(PageResult::new(records, total, current, size))
}

/// Rows to skip before `current`, capped at the largest OFFSET the
/// database accepts.
fn page_offset(current: u64, size: u64) -> u64 {
    current
        .saturating_sub(1)
        .saturating_mul(size)
        .min(i64::MAX as u64)
}

/// Reject blank required text fields.
pub(crate) fn require(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(3, 20), 40);
        assert_eq!(page_offset(u64::MAX, 100), i64::MAX as u64);
    }

    #[test]
    fn test_require() {
        assert!(require("name", "x").is_ok());
        assert!(matches!(require("name", "  "), Err(AppError::Validation(m)) if m == "name is required"));
    }
}
