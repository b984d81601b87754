use super::LOCK_TABLE;
use barrel::{backend::Sqlite, types, Migration};

// Single-row table: the lock is taken by inserting id = 1.
pub fn migration() -> String {
    let mut m = Migration::new();

    m.create_table(LOCK_TABLE, |t| {
        t.add_column("id", types::integer().primary(true));
        t.add_column("holder", types::text().nullable(false));
        t.add_column("acquired_at", types::text().nullable(false));
    });

    m.make::<Sqlite>()
}
