use crate::migrate::schema::{ColumnSpec, ColumnType, IndexSpec, SchemaChange, TableSpec};
use barrel::{backend::Sqlite, types, Migration};

/// Schema-change capability the runner composes with.
///
/// Each method renders one change as SQL text, so statements can be logged
/// or printed in a dry run before anything is executed.
pub trait SchemaBackend {
    fn create_table(&self, table: &TableSpec) -> String;
    fn drop_table(&self, table: &str) -> String;
    fn add_column(&self, table: &str, column: &ColumnSpec) -> String;
    fn drop_column(&self, table: &str, column: &str) -> String;
    fn add_index(&self, table: &str, index: &IndexSpec) -> String;
    fn drop_index(&self, table: &str, index: &str) -> String;

    fn render(&self, change: &SchemaChange) -> String {
        match change {
            SchemaChange::CreateTable(spec) => self.create_table(spec),
            SchemaChange::DropTable(table) => self.drop_table(table),
            SchemaChange::AddColumn { table, column } => self.add_column(table, column),
            SchemaChange::DropColumn { table, column } => self.drop_column(table, column),
            SchemaChange::AddIndex { table, index } => self.add_index(table, index),
            SchemaChange::DropIndex { table, name } => self.drop_index(table, name),
        }
    }
}

/// SQLite dialect. Table-level DDL goes through barrel.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteBackend;

fn column_type(column: &ColumnSpec) -> types::Type {
    let base = match column.column_type() {
        ColumnType::BigIncrements => types::primary().increments(true),
        ColumnType::Integer => types::integer(),
        ColumnType::BigInteger => types::custom("BIGINT"),
        ColumnType::String(len) => types::varchar(len),
        ColumnType::Text => types::text(),
        ColumnType::Timestamp => types::custom("TIMESTAMP"),
        ColumnType::Boolean => types::boolean(),
    };
    match column.column_type() {
        ColumnType::BigIncrements => base,
        _ => base
            .nullable(column.is_nullable())
            .unique(column.is_unique()),
    }
}

// Backticks, since SQLite reads an unknown double-quoted name as a string literal.
fn quote(identifier: &str) -> String {
    format!("`{}`", identifier)
}

impl SchemaBackend for SqliteBackend {
    fn create_table(&self, table: &TableSpec) -> String {
        let spec = table.clone();
        let mut m = Migration::new();

        m.create_table(table.name(), move |t| {
            for column in spec.columns() {
                t.add_column(column.name(), column_type(column));
            }
            for index in spec.indexes() {
                let columns: Vec<&str> = index.columns().iter().map(String::as_str).collect();
                t.add_index(index.name(), types::index(columns).unique(index.is_unique()));
            }
        });

        m.make::<Sqlite>()
    }

    fn drop_table(&self, table: &str) -> String {
        let mut m = Migration::new();
        m.drop_table(table);
        m.make::<Sqlite>()
    }

    fn add_column(&self, table: &str, column: &ColumnSpec) -> String {
        let column = column.clone();
        let mut m = Migration::new();

        m.change_table(table, move |t| {
            t.add_column(column.name(), column_type(&column));
        });

        m.make::<Sqlite>()
    }

    // Needs SQLite 3.35 or newer.
    fn drop_column(&self, table: &str, column: &str) -> String {
        format!("ALTER TABLE {} DROP COLUMN {};", quote(table), quote(column))
    }

    fn add_index(&self, table: &str, index: &IndexSpec) -> String {
        let columns: Vec<String> = index.columns().iter().map(|c| quote(c)).collect();
        format!(
            "CREATE {}INDEX {} ON {} ({});",
            if index.is_unique() { "UNIQUE " } else { "" },
            quote(index.name()),
            quote(table),
            columns.join(", ")
        )
    }

    fn drop_index(&self, _table: &str, index: &str) -> String {
        format!("DROP INDEX {};", quote(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{Connection, NO_PARAMS};

    fn widgets() -> TableSpec {
        TableSpec::new("widgets")
            .column(ColumnSpec::big_increments("id"))
            .column(ColumnSpec::string("sku").unique())
            .column(ColumnSpec::text("notes").nullable())
            .column(ColumnSpec::boolean("active"))
            .timestamps()
            .index(&["created_at"])
    }

    fn columns_of(conn: &Connection, table: &str) -> Vec<(String, bool)> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", quote(table)))
            .unwrap();
        let rows = stmt
            .query_map(NO_PARAMS, |row| {
                let name: String = row.get(1)?;
                let not_null: i64 = row.get(3)?;
                Ok((name, not_null == 0))
            })
            .unwrap();
        rows.map(Result::unwrap).collect()
    }

    fn index_names(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .unwrap();
        let rows = stmt.query_map(&[table], |row| row.get(0)).unwrap();
        rows.map(Result::unwrap).collect()
    }

    #[test]
    fn create_table_executes_on_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        let sql = SqliteBackend.create_table(&widgets());
        assert!(sql.contains("widgets"));
        conn.execute_batch(&sql).unwrap();

        let columns = columns_of(&conn, "widgets");
        let names: Vec<&str> = columns.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["id", "sku", "notes", "active", "created_at", "updated_at"]
        );
        assert_eq!(columns[1], ("sku".to_string(), false));
        assert_eq!(columns[2], ("notes".to_string(), true));
        assert_eq!(index_names(&conn, "widgets"), vec!["widgets_created_at_index"]);
    }

    #[test]
    fn hand_rendered_statements() {
        let index = IndexSpec::unique_on("widgets", &["sku", "active"]);
        assert_eq!(
            SqliteBackend.add_index("widgets", &index),
            "CREATE UNIQUE INDEX `widgets_sku_active_unique` ON `widgets` (`sku`, `active`);"
        );
        assert_eq!(
            SqliteBackend.drop_index("widgets", "widgets_sku_active_unique"),
            "DROP INDEX `widgets_sku_active_unique`;"
        );
        assert_eq!(
            SqliteBackend.drop_column("widgets", "notes"),
            "ALTER TABLE `widgets` DROP COLUMN `notes`;"
        );
    }

    #[test]
    fn index_on_missing_column_fails() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&SqliteBackend.create_table(
            &TableSpec::new("half").column(ColumnSpec::big_increments("id")),
        ))
        .unwrap();

        let plain = SqliteBackend.add_index("half", &IndexSpec::on("half", &["missing_column"]));
        assert!(conn.execute_batch(&plain).is_err());
        let unique = SqliteBackend.add_index("half", &IndexSpec::unique_on("half", &["nope"]));
        assert!(conn.execute_batch(&unique).is_err());
        assert!(index_names(&conn, "half").is_empty());

        conn.execute_batch("INSERT INTO half DEFAULT VALUES; INSERT INTO half DEFAULT VALUES;")
            .unwrap();
    }

    #[test]
    fn dropping_a_missing_index_fails() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(conn
            .execute_batch(&SqliteBackend.drop_index("half", "half_missing_index"))
            .is_err());
    }

    #[test]
    fn render_dispatches_every_change() {
        let conn = Connection::open_in_memory().unwrap();
        let changes = vec![
            SchemaChange::CreateTable(widgets()),
            SchemaChange::AddColumn {
                table: "widgets".to_string(),
                column: ColumnSpec::integer("weight").nullable(),
            },
            SchemaChange::AddIndex {
                table: "widgets".to_string(),
                index: IndexSpec::on("widgets", &["weight"]),
            },
            SchemaChange::DropIndex {
                table: "widgets".to_string(),
                name: "widgets_weight_index".to_string(),
            },
            SchemaChange::DropTable("widgets".to_string()),
        ];
        for change in &changes {
            conn.execute_batch(&SqliteBackend.render(change)).unwrap();
            if let SchemaChange::AddColumn { .. } = change {
                assert!(columns_of(&conn, "widgets")
                    .iter()
                    .any(|(name, nullable)| name == "weight" && *nullable));
            }
        }
        assert!(columns_of(&conn, "widgets").is_empty());
    }
}
