//! Project data scope
//!
//! A role's `data_scope` decides which project rows its members see in list
//! queries. Roles are OR-ed together: one role granting `ALL` grants it for
//! the user.

use sea_orm::{sea_query::Expr, ColumnTrait, Condition};
use serde::Serialize;
use std::collections::HashSet;

use crate::entity::project;

/// Sentinel data scope entry that lifts all project filtering.
pub const SCOPE_ALL: &str = "ALL";

/// Effective project visibility for one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProjectScope {
    /// No filter
    All,
    /// Only the listed project codes
    Codes {
        #[serde(rename = "projectCodes")]
        project_codes: Vec<String>,
    },
    /// Projects the user manages or directs
    Owned,
    /// No projects at all (the user does not exist)
    Nothing,
}

impl ProjectScope {
    /// Fold the data scope entries of every role the user holds.
    ///
    /// Each item is one role's split `data_scope`. Codes keep first-seen
    /// order and are deduplicated. When no role contributes a code the
    /// ownership rule applies.
    pub fn from_role_scopes<I>(scopes: I) -> Self
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let mut seen = HashSet::new();
        let mut project_codes = Vec::new();

        for scope in scopes {
            if scope.iter().any(|s| s == SCOPE_ALL) {
                return ProjectScope::All;
            }
            for code in scope {
                if seen.insert(code.clone()) {
                    project_codes.push(code);
                }
            }
        }

        if project_codes.is_empty() {
            ProjectScope::Owned
        } else {
            ProjectScope::Codes { project_codes }
        }
    }

    /// Filter for the project listing query. Combine with search terms
    /// through `Condition::all()`.
    pub fn condition(&self, user_code: &str) -> Condition {
        match self {
            ProjectScope::All => Condition::all(),
            ProjectScope::Codes { project_codes } => Condition::all()
                .add(project::Column::ProjectCode.is_in(project_codes.iter().cloned())),
            ProjectScope::Owned => Condition::any()
                .add(project::Column::ManagerUserCode.eq(user_code))
                .add(project::Column::DirectorUserCode.eq(user_code)),
            ProjectScope::Nothing => Condition::all().add(Expr::val(1).eq(0)),
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, ProjectScope::Nothing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, EntityTrait, QueryFilter, QueryTrait};

    fn scopes(raw: &[&str]) -> Vec<Vec<String>> {
        raw.iter().map(|s| crate::entity::split_list(s)).collect()
    }

    fn sorted(scope: ProjectScope) -> Vec<String> {
        match scope {
            ProjectScope::Codes { mut project_codes } => {
                project_codes.sort();
                project_codes
            }
            other => panic!("expected codes, got {:?}", other),
        }
    }

    #[test]
    fn test_all_wins_over_codes() {
        assert_eq!(ProjectScope::from_role_scopes(scopes(&["P1", "ALL"])), ProjectScope::All);
        assert_eq!(ProjectScope::from_role_scopes(scopes(&["P1, ALL"])), ProjectScope::All);
    }

    #[test]
    fn test_codes_are_unioned() {
        let scope = ProjectScope::from_role_scopes(scopes(&["P1,P2", "P2, P3"]));
        assert_eq!(sorted(scope), vec!["P1", "P2", "P3"]);
    }

    #[test]
    fn test_no_scope_falls_back_to_owned() {
        assert_eq!(ProjectScope::from_role_scopes(Vec::new()), ProjectScope::Owned);
        assert_eq!(ProjectScope::from_role_scopes(scopes(&["", " , "])), ProjectScope::Owned);
    }

    #[test]
    fn test_all_is_case_sensitive() {
        let scope = ProjectScope::from_role_scopes(scopes(&["all"]));
        assert_eq!(sorted(scope), vec!["all"]);
    }

    #[test]
    fn test_serialized_kind() {
        let json = serde_json::to_value(ProjectScope::Codes {
            project_codes: vec!["P1".to_string()],
        })
        .unwrap();
        assert_eq!(json["kind"], "codes");
        assert_eq!(json["projectCodes"][0], "P1");
        assert_eq!(serde_json::to_value(ProjectScope::Owned).unwrap()["kind"], "owned");
    }

    fn sql(scope: &ProjectScope) -> String {
        project::Entity::find()
            .filter(scope.condition("u001"))
            .build(DbBackend::Postgres)
            .to_string()
    }

    #[test]
    fn test_condition_sql() {
        let all = sql(&ProjectScope::All);
        assert!(!all.contains("project_code\" IN"));
        assert!(!all.contains("manager_user_code\" ="));

        let codes = sql(&ProjectScope::Codes {
            project_codes: vec!["P1".to_string(), "P2".to_string()],
        });
        assert!(codes.contains(r#""project_code" IN ('P1', 'P2')"#));

        let owned = sql(&ProjectScope::Owned);
        assert!(owned.contains(r#""manager_user_code" = 'u001'"#));
        assert!(owned.contains(" OR "));
        assert!(owned.contains(r#""director_user_code" = 'u001'"#));

        let nothing = sql(&ProjectScope::Nothing);
        assert!(nothing.contains("WHERE 1 = 0"));
        assert_eq!(serde_json::to_value(ProjectScope::Nothing).unwrap()["kind"], "nothing");
    }
}
