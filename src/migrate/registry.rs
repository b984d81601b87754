use crate::migrate::descriptor::Migration;
use crate::migrate::errors::{NotFound, RegistryConflict, Result};
use snafu::OptionExt;

/// Known migrations in ascending id order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    migrations: Vec<Migration>,
}

impl Registry {
    pub fn new<I>(migrations: I) -> Result<Self>
    where
        I: IntoIterator<Item = Migration>,
    {
        let mut migrations: Vec<Migration> = migrations.into_iter().collect();
        migrations.sort_by(|a, b| a.id().cmp(b.id()));
        if let Some(pair) = migrations.windows(2).find(|w| w[0].id() == w[1].id()) {
            return RegistryConflict { id: pair[0].id() }.fail();
        }
        Ok(Registry { migrations })
    }

    pub fn list(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn find(&self, id: &str) -> Result<&Migration> {
        self.migrations
            .binary_search_by(|m| m.id().cmp(id))
            .ok()
            .map(|idx| &self.migrations[idx])
            .context(NotFound { id })
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::errors::Error;
    use crate::migrate::schema::{ColumnSpec, TableSpec};

    fn migration(id: &str, table: &str) -> Migration {
        Migration::create_table(
            id,
            TableSpec::new(table).column(ColumnSpec::big_increments("id")),
        )
        .unwrap()
    }

    #[test]
    fn list_is_sorted_by_id() {
        let registry = Registry::new(vec![
            migration("2015_03_07_000003_c", "c"),
            migration("2015_03_07_000001_a", "a"),
            migration("2015_03_07_000002_b", "b"),
        ])
        .unwrap();
        let ids: Vec<&str> = registry.list().iter().map(Migration::id).collect();
        assert_eq!(
            ids,
            vec![
                "2015_03_07_000001_a",
                "2015_03_07_000002_b",
                "2015_03_07_000003_c"
            ]
        );
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn duplicate_id_is_a_conflict() {
        let err = Registry::new(vec![
            migration("0001_a", "a"),
            migration("0002_b", "b"),
            migration("0001_a", "other"),
        ])
        .unwrap_err();
        match err {
            Error::RegistryConflict { id } => assert_eq!(id, "0001_a"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn find_known_and_unknown() {
        let registry = Registry::new(vec![migration("0001_a", "a"), migration("0002_b", "b")])
            .unwrap();
        assert_eq!(registry.find("0002_b").unwrap().id(), "0002_b");
        match registry.find("0003_c") {
            Err(Error::NotFound { id }) => assert_eq!(id, "0003_c"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn empty_registry() {
        let registry = Registry::new(Vec::new()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
    }
}
