use sea_orm::sea_query::TableCreateStatement;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbBackend, DbErr, EntityTrait, PaginatorTrait, QueryFilter, Schema, Set, Statement,
};
use std::time::Duration;
use tracing::info;

use crate::config::{DatabaseConfig, SeedConfig};
use crate::entity::{
    department, now_ts, permission, project, project_member, role, role_permission, timesheet, user,
};
use crate::permission::SCOPE_ALL;

/// Role created on first boot, holding every seeded permission.
pub const ADMIN_ROLE: &str = "admin";

const SEED_AUTHOR: &str = "system";

/// Initialize database connection and auto-migrate tables
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let database_url = config.connection_url();

    info!("Connecting to database: {}:{}/{}", config.host, config.port, config.name);

    let mut opt = ConnectOptions::new(&database_url);
    opt.max_connections(50)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(config.logging)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .set_schema_search_path("public");

    let db = Database::connect(opt).await?;
    info!("Database connection established");

    auto_migrate(&db).await?;

    Ok(db)
}

/// Create entity tables that do not exist yet
async fn auto_migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    info!("Running auto-migration for all entities...");

    create_table_if_not_exists(db, backend, schema.create_table_from_entity(permission::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(role::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(role_permission::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(user::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(project::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(project_member::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(department::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(timesheet::Entity)).await?;

    info!("Auto-migration completed successfully");
    Ok(())
}

async fn create_table_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: TableCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();

    let sql = backend.build(&stmt);

    db.execute(Statement::from_string(backend, sql.to_string())).await?;

    Ok(())
}

/// Built-in permission node
struct DefaultNode {
    code: &'static str,
    name: &'static str,
    menu_name: &'static str,
    module: &'static str,
    parent: Option<&'static str>,
    kind: &'static str,
    path: Option<&'static str>,
    icon: Option<&'static str>,
    component: Option<&'static str>,
    sort: i32,
}

const fn menu(
    code: &'static str,
    name: &'static str,
    menu_name: &'static str,
    module: &'static str,
    parent: Option<&'static str>,
    path: Option<&'static str>,
    icon: &'static str,
    component: Option<&'static str>,
    sort: i32,
) -> DefaultNode {
    DefaultNode {
        code,
        name,
        menu_name,
        module,
        parent,
        kind: permission::TYPE_MENU,
        path,
        icon: Some(icon),
        component,
        sort,
    }
}

const fn button(code: &'static str, name: &'static str, module: &'static str, parent: &'static str, sort: i32) -> DefaultNode {
    DefaultNode {
        code,
        name,
        menu_name: "",
        module,
        parent: Some(parent),
        kind: "button",
        path: None,
        icon: None,
        component: None,
        sort,
    }
}

#[rustfmt::skip]
const DEFAULT_NODES: &[DefaultNode] = &[
    menu("system", "System Management", "systemManagement", "system", None, None, "settings", None, 0),
    menu("system:user", "User Management", "userManagement", "system", Some("system"), Some("/user"), "person", Some("pages/user/UserManagement.vue"), 0),
    menu("system:permission", "Permission Management", "permissionManagement", "system", Some("system"), Some("/permission"), "lock", Some("pages/permission/PermissionManagement.vue"), 1),
    menu("system:role", "Role Management", "roleManagement", "system", Some("system"), Some("/role"), "group", Some("pages/role/RoleManagement.vue"), 2),
    menu("system:department", "Department Management", "departmentManagement", "system", Some("system"), Some("/department"), "corporate_fare", Some("pages/department/DepartmentManagement.vue"), 3),
    menu("project", "Project Management", "projectManagement", "project", None, None, "view_list", None, 1),
    menu("project:project", "Project Management", "projectManagement", "project", Some("project"), Some("/project"), "work", Some("pages/project/ProjectManagement.vue"), 0),
    menu("timesheet", "Timesheet Management", "timesheetManagement", "timesheet", None, None, "schedule", None, 2),
    menu("timesheet:my-timesheets", "My Timesheets", "myTimesheets", "timesheet", Some("timesheet"), Some("/timesheet/my-timesheets"), "access_time", Some("pages/timesheet/MyTimesheetPage.vue"), 0),
    menu("timesheet:review", "Timesheet Review", "timesheetReview", "timesheet", Some("timesheet"), Some("/timesheet/review"), "rate_review", Some("pages/timesheet/TimesheetReviewPage.vue"), 1),
    menu("timesheet:project-manager-timesheets", "Project Manager Timesheets", "projectManagerTimesheets", "timesheet", Some("timesheet"), Some("/timesheet/project-manager-timesheets"), "folder_shared", Some("pages/timesheet/ProjectManagerTimesheetsPage.vue"), 2),
    menu("timesheet:statistics", "Timesheet Statistics", "timesheetStatistics", "timesheet", Some("timesheet"), Some("/timesheet/statistics"), "insights", Some("pages/timesheet/TimesheetStatisticsPage.vue"), 3),
    button("system:user:create", "Create User", "system", "system:user", 0),
    button("system:user:delete", "Delete User", "system", "system:user", 1),
    button("system:role:update", "Edit Role Permissions", "system", "system:role", 0),
    button("project:project:create", "Create Project", "project", "project:project", 0),
];

fn default_node_model(node: &DefaultNode, created_at: i64) -> permission::ActiveModel {
    permission::ActiveModel {
        name: Set(node.name.to_string()),
        menu_name: Set(Some(node.menu_name).filter(|m| !m.is_empty()).map(str::to_string)),
        code: Set(node.code.to_string()),
        module: Set(node.module.to_string()),
        parent_code: Set(node.parent.map(str::to_string)),
        kind: Set(Some(node.kind.to_string())),
        path: Set(node.path.map(str::to_string)),
        icon: Set(node.icon.map(str::to_string)),
        component: Set(node.component.map(str::to_string)),
        sort: Set(node.sort),
        description: Set(format!("{} ({})", node.name, node.kind)),
        status: Set(permission::STATUS_ENABLED),
        created_by: Set(Some(SEED_AUTHOR.to_string())),
        created_at: Set(created_at),
        ..Default::default()
    }
}

/// Insert default permissions, the admin role and the admin user.
///
/// Each step is skipped when its data already exists, so running this on
/// every boot is safe.
pub async fn seed_defaults(db: &DatabaseConnection, seed: &SeedConfig) -> Result<(), DbErr> {
    if !seed.enabled {
        return Ok(());
    }

    seed_permissions(db).await?;
    seed_admin_role(db).await?;
    seed_admin_user(db, seed).await?;

    Ok(())
}

async fn seed_permissions(db: &DatabaseConnection) -> Result<(), DbErr> {
    if permission::Entity::find().count(db).await? > 0 {
        info!("Permissions already exist, skipping permission seeding");
        return Ok(());
    }

    let now = now_ts();
    permission::Entity::insert_many(DEFAULT_NODES.iter().map(|n| default_node_model(n, now)))
        .exec(db)
        .await?;

    info!("Seeded {} permissions", DEFAULT_NODES.len());
    Ok(())
}

async fn seed_admin_role(db: &DatabaseConnection) -> Result<(), DbErr> {
    let existing = role::Entity::find()
        .filter(role::Column::Name.eq(ADMIN_ROLE))
        .one(db)
        .await?;
    if existing.is_some() {
        info!("Role {} already exists, skipping role seeding", ADMIN_ROLE);
        return Ok(());
    }

    role::ActiveModel {
        name: Set(ADMIN_ROLE.to_string()),
        description: Set("System administrator with full permissions".to_string()),
        data_scope: Set(Some(SCOPE_ALL.to_string())),
        created_by: Set(Some(SEED_AUTHOR.to_string())),
        created_at: Set(now_ts()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let codes: Vec<String> = permission::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.code)
        .collect();

    if !codes.is_empty() {
        role_permission::Entity::insert_many(
            codes
                .iter()
                .map(|code| role_permission::new_grant(ADMIN_ROLE, code, Some(SEED_AUTHOR))),
        )
        .exec(db)
        .await?;
    }

    info!("Created role {} with {} permissions", ADMIN_ROLE, codes.len());
    Ok(())
}

async fn seed_admin_user(db: &DatabaseConnection, seed: &SeedConfig) -> Result<(), DbErr> {
    let existing = user::Entity::find()
        .filter(user::Column::UserCode.eq(&seed.admin_user_code))
        .one(db)
        .await?;
    if existing.is_some() {
        info!("User {} already exists, skipping user seeding", seed.admin_user_code);
        return Ok(());
    }

    let hashed = bcrypt::hash(&seed.admin_password, bcrypt::DEFAULT_COST)
        .map_err(|e| DbErr::Custom(format!("failed to hash admin password: {}", e)))?;

    user::ActiveModel {
        user_code: Set(seed.admin_user_code.clone()),
        user_name: Set("Administrator".to_string()),
        password: Set(hashed),
        email: Set(None),
        role_name: Set(Some(ADMIN_ROLE.to_string())),
        status: Set(user::UserStatus::Active.into()),
        created_by: Set(Some(SEED_AUTHOR.to_string())),
        created_at: Set(now_ts()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::warn!(
        "Created user {} with the configured default password, change it after first login",
        seed.admin_user_code
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{MockDatabase, Value};
    use std::collections::{BTreeMap, HashSet};

    #[test]
    fn test_default_nodes_form_a_tree() {
        let codes: HashSet<&str> = DEFAULT_NODES.iter().map(|n| n.code).collect();
        assert_eq!(codes.len(), DEFAULT_NODES.len(), "codes must be unique");

        for node in DEFAULT_NODES {
            if let Some(parent) = node.parent {
                assert!(codes.contains(parent), "{} has unknown parent {}", node.code, parent);
            }
        }
    }

    #[test]
    fn test_default_node_model() {
        let model = default_node_model(&DEFAULT_NODES[0], 42);
        assert_eq!(model.code, Set("system".to_string()));
        assert_eq!(model.parent_code, Set(None));
        assert_eq!(model.kind, Set(Some("menu".to_string())));
        assert_eq!(model.status, Set(permission::STATUS_ENABLED));

        let last = default_node_model(DEFAULT_NODES.last().unwrap(), 42);
        assert_eq!(last.kind, Set(Some("button".to_string())));
        assert_eq!(last.menu_name, Set(None));
    }

    #[tokio::test]
    async fn test_seed_skips_existing_data() {
        let count: BTreeMap<&str, Value> = [("num_items", Value::BigInt(Some(3)))].into_iter().collect();
        let admin_role = role::Model {
            id: 1,
            name: ADMIN_ROLE.to_string(),
            description: String::new(),
            data_scope: Some(SCOPE_ALL.to_string()),
            created_by: None,
            created_at: 0,
            updated_by: None,
            updated_at: None,
        };
        let admin_user = user::Model {
            id: 1,
            user_code: "admin".to_string(),
            user_name: "Administrator".to_string(),
            password: String::new(),
            email: None,
            role_name: Some(ADMIN_ROLE.to_string()),
            department_name: None,
            status: 1,
            created_by: None,
            created_at: 0,
            updated_by: None,
            updated_at: None,
        };

        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![count]])
            .append_query_results([vec![admin_role]])
            .append_query_results([vec![admin_user]])
            .into_connection();

        seed_defaults(&db, &SeedConfig::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_seed_disabled_touches_nothing() {
        let db = MockDatabase::new(DbBackend::Postgres).into_connection();
        let seed = SeedConfig {
            enabled: false,
            ..Default::default()
        };
        seed_defaults(&db, &seed).await.unwrap();
    }
}
