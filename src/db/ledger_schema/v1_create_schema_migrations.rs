use super::LEDGER_TABLE;
use barrel::{backend::Sqlite, types, Migration};

pub fn migration() -> String {
    let mut m = Migration::new();

    m.create_table(LEDGER_TABLE, |t| {
        t.add_column(
            "migration_id",
            types::varchar(255).nullable(false).unique(true),
        );
        t.add_column("batch", types::integer().nullable(false));
        t.add_column("applied_at", types::text().nullable(false));

        t.add_index(
            "idx_schema_migrations_applied_at",
            types::index(vec!["applied_at"]).unique(false),
        );
    });

    m.make::<Sqlite>()
}
