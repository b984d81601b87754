use refinery::{Migration, Runner};
use refinery_migrations::MigrationPrefix;

mod v1_create_schema_migrations;
mod v2_create_schema_migration_lock;

pub const LEDGER_TABLE: &str = "schema_migrations";
pub const LOCK_TABLE: &str = "schema_migration_lock";

/// Versioned bootstrap of the tables the migration runner keeps its own state in.
pub fn runner() -> Runner {
    let migrations = vec![
        Migration {
            name: "v1_create_schema_migrations".to_string(),
            version: 1,
            prefix: MigrationPrefix::Versioned,
            sql: v1_create_schema_migrations::migration(),
        },
        Migration {
            name: "v2_create_schema_migration_lock".to_string(),
            version: 2,
            prefix: MigrationPrefix::Versioned,
            sql: v2_create_schema_migration_lock::migration(),
        },
    ];

    Runner::new(&migrations)
}
