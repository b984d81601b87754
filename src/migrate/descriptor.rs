use crate::migrate::errors::{InvalidSchema, Result};
use crate::migrate::schema::{SchemaChange, SchemaViolation, TableSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use snafu::ensure;

static MIGRATION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("migration id pattern is valid"));

/// A single reversible schema migration.
///
/// Construction validates every change, so a `Migration` that exists is
/// structurally sound. It only becomes SQL once a backend renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    id: String,
    up: Vec<SchemaChange>,
    down: Vec<SchemaChange>,
}

impl Migration {
    pub fn new<S: Into<String>>(
        id: S,
        up: Vec<SchemaChange>,
        down: Vec<SchemaChange>,
    ) -> Result<Self> {
        let id = id.into();
        ensure!(
            MIGRATION_ID.is_match(&id),
            InvalidSchema {
                id: id.clone(),
                violation: SchemaViolation::BadIdentifier { name: id.clone() },
            }
        );
        ensure!(
            !up.is_empty(),
            InvalidSchema {
                id: id.clone(),
                violation: SchemaViolation::NoForwardChanges,
            }
        );
        ensure!(
            !down.is_empty(),
            InvalidSchema {
                id: id.clone(),
                violation: SchemaViolation::NoBackwardChanges,
            }
        );
        for change in up.iter().chain(down.iter()) {
            if let Err(violation) = change.validate() {
                return InvalidSchema { id, violation }.fail();
            }
        }
        Ok(Migration { id, up, down })
    }

    /// Creates `table` on the way up and drops it on the way down.
    pub fn create_table<S: Into<String>>(id: S, table: TableSpec) -> Result<Self> {
        let drop = SchemaChange::DropTable(table.name().to_string());
        Self::new(id, vec![SchemaChange::CreateTable(table)], vec![drop])
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Forward changes, in execution order.
    pub fn apply(&self) -> &[SchemaChange] {
        &self.up
    }

    /// Backward changes, in execution order.
    pub fn revert(&self) -> &[SchemaChange] {
        &self.down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::errors::Error;
    use crate::migrate::schema::{ColumnSpec, IndexSpec};

    fn table() -> TableSpec {
        TableSpec::new("widgets")
            .column(ColumnSpec::big_increments("id"))
            .column(ColumnSpec::string("sku").unique())
    }

    #[test]
    fn create_table_pairs_with_drop() {
        let m = Migration::create_table("0001_widgets", table()).unwrap();
        assert_eq!(m.id(), "0001_widgets");
        assert_eq!(m.apply(), &[SchemaChange::CreateTable(table())][..]);
        assert_eq!(
            m.revert(),
            &[SchemaChange::DropTable("widgets".to_string())][..]
        );
    }

    #[test]
    fn duplicate_column_fails_with_invalid_schema() {
        let err = Migration::create_table("0001_widgets", table().column(ColumnSpec::text("sku")))
            .unwrap_err();
        match err {
            Error::InvalidSchema { id, violation } => {
                assert_eq!(id, "0001_widgets");
                assert!(matches!(violation, SchemaViolation::DuplicateColumn { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn bad_id_is_rejected() {
        let err = Migration::create_table("", table()).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema { .. }));
        let err = Migration::create_table("0001 widgets", table()).unwrap_err();
        assert_eq!(err.migration_id(), Some("0001 widgets"));
    }

    #[test]
    fn both_directions_are_required() {
        let err = Migration::new("0002_empty", vec![], vec![]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSchema {
                violation: SchemaViolation::NoForwardChanges,
                ..
            }
        ));
        let add = SchemaChange::AddIndex {
            table: "widgets".to_string(),
            index: IndexSpec::on("widgets", &["sku"]),
        };
        let err = Migration::new("0002_sku_index", vec![add], vec![]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSchema {
                violation: SchemaViolation::NoBackwardChanges,
                ..
            }
        ));
    }

    #[test]
    fn down_changes_are_validated_too() {
        let up = SchemaChange::CreateTable(table());
        let down = SchemaChange::DropTable("widgets; --".to_string());
        assert!(Migration::new("0003_bad_down", vec![up], vec![down]).is_err());
    }
}
