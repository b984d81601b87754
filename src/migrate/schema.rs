//! Declarative table, column and index descriptions.
//!
//! Nothing in here touches a database. A [`SchemaChange`] is plain data that a
//! [`SchemaBackend`](crate::migrate::sql::SchemaBackend) turns into SQL.
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

pub(crate) fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Default length of a `string` column.
pub const DEFAULT_STRING_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Auto-incrementing 64-bit primary key.
    BigIncrements,
    Integer,
    BigInteger,
    String(usize),
    Text,
    Timestamp,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnSpec {
    name: String,
    column_type: ColumnType,
    nullable: bool,
    unique: bool,
}

impl ColumnSpec {
    pub fn new<S: Into<String>>(name: S, column_type: ColumnType) -> Self {
        ColumnSpec {
            name: name.into(),
            column_type,
            nullable: false,
            unique: false,
        }
    }

    pub fn big_increments<S: Into<String>>(name: S) -> Self {
        Self::new(name, ColumnType::BigIncrements)
    }

    pub fn integer<S: Into<String>>(name: S) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn big_integer<S: Into<String>>(name: S) -> Self {
        Self::new(name, ColumnType::BigInteger)
    }

    pub fn string<S: Into<String>>(name: S) -> Self {
        Self::new(name, ColumnType::String(DEFAULT_STRING_LENGTH))
    }

    pub fn text<S: Into<String>>(name: S) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn timestamp<S: Into<String>>(name: S) -> Self {
        Self::new(name, ColumnType::Timestamp)
    }

    pub fn boolean<S: Into<String>>(name: S) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexSpec {
    name: String,
    columns: Vec<String>,
    unique: bool,
}

impl IndexSpec {
    pub fn new<S: Into<String>>(name: S, columns: &[&str]) -> Self {
        IndexSpec {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        }
    }

    /// Index named `<table>_<columns>_index`.
    pub fn on(table: &str, columns: &[&str]) -> Self {
        Self::new(format!("{}_{}_index", table, columns.join("_")), columns)
    }

    /// Unique index named `<table>_<columns>_unique`.
    pub fn unique_on(table: &str, columns: &[&str]) -> Self {
        let mut index = Self::new(format!("{}_{}_unique", table, columns.join("_")), columns);
        index.unique = true;
        index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableSpec {
    name: String,
    columns: Vec<ColumnSpec>,
    indexes: Vec<IndexSpec>,
}

impl TableSpec {
    pub fn new<S: Into<String>>(name: S) -> Self {
        TableSpec {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Nullable `created_at` and `updated_at` columns.
    pub fn timestamps(self) -> Self {
        self.column(ColumnSpec::timestamp("created_at").nullable())
            .column(ColumnSpec::timestamp("updated_at").nullable())
    }

    /// Adds a plain index named after the table and columns.
    pub fn index(self, columns: &[&str]) -> Self {
        let index = IndexSpec::on(&self.name, columns);
        self.with_index(index)
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub fn validate(&self) -> Result<(), SchemaViolation> {
        check_identifier(&self.name)?;
        if self.columns.is_empty() {
            return Err(SchemaViolation::NoColumns {
                table: self.name.clone(),
            });
        }

        let mut seen = HashSet::with_capacity(self.columns.len());
        let mut auto_increments = 0;
        for column in &self.columns {
            check_identifier(&column.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaViolation::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
            if column.column_type == ColumnType::BigIncrements {
                auto_increments += 1;
            }
        }
        if auto_increments > 1 {
            return Err(SchemaViolation::MultipleAutoIncrements {
                table: self.name.clone(),
            });
        }

        let mut index_names = HashSet::with_capacity(self.indexes.len());
        for index in &self.indexes {
            validate_index(&self.name, index)?;
            if !index_names.insert(index.name.as_str()) {
                return Err(SchemaViolation::DuplicateIndex {
                    table: self.name.clone(),
                    index: index.name.clone(),
                });
            }
            if let Some(missing) = index.columns.iter().find(|c| !seen.contains(c.as_str())) {
                return Err(SchemaViolation::UnknownIndexColumn {
                    index: index.name.clone(),
                    column: missing.clone(),
                });
            }
        }
        Ok(())
    }
}

fn check_identifier(name: &str) -> Result<(), SchemaViolation> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(SchemaViolation::BadIdentifier {
            name: name.to_string(),
        })
    }
}

fn validate_index(table: &str, index: &IndexSpec) -> Result<(), SchemaViolation> {
    check_identifier(&index.name)?;
    if index.columns.is_empty() {
        return Err(SchemaViolation::EmptyIndex {
            table: table.to_string(),
            index: index.name.clone(),
        });
    }
    index.columns.iter().try_for_each(|c| check_identifier(c))
}

/// One schema-change statement, kept as data until a backend renders it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchemaChange {
    CreateTable(TableSpec),
    DropTable(String),
    AddColumn { table: String, column: ColumnSpec },
    DropColumn { table: String, column: String },
    AddIndex { table: String, index: IndexSpec },
    DropIndex { table: String, name: String },
}

impl SchemaChange {
    pub fn table(&self) -> &str {
        match self {
            SchemaChange::CreateTable(spec) => spec.name(),
            SchemaChange::DropTable(table)
            | SchemaChange::AddColumn { table, .. }
            | SchemaChange::DropColumn { table, .. }
            | SchemaChange::AddIndex { table, .. }
            | SchemaChange::DropIndex { table, .. } => table,
        }
    }

    pub fn validate(&self) -> Result<(), SchemaViolation> {
        match self {
            SchemaChange::CreateTable(spec) => spec.validate(),
            SchemaChange::DropTable(table) => check_identifier(table),
            SchemaChange::AddColumn { table, column } => {
                check_identifier(table)?;
                check_identifier(column.name())
            }
            SchemaChange::DropColumn { table, column } => {
                check_identifier(table)?;
                check_identifier(column)
            }
            SchemaChange::AddIndex { table, index } => {
                check_identifier(table)?;
                validate_index(table, index)
            }
            SchemaChange::DropIndex { table, name } => {
                check_identifier(table)?;
                check_identifier(name)
            }
        }
    }
}

impl Display for SchemaChange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaChange::CreateTable(spec) => write!(f, "create table {}", spec.name()),
            SchemaChange::DropTable(table) => write!(f, "drop table {}", table),
            SchemaChange::AddColumn { table, column } => {
                write!(f, "add column {}.{}", table, column.name())
            }
            SchemaChange::DropColumn { table, column } => {
                write!(f, "drop column {}.{}", table, column)
            }
            SchemaChange::AddIndex { table, index } => {
                write!(f, "add index {} on {}", index.name(), table)
            }
            SchemaChange::DropIndex { table, name } => write!(f, "drop index {} on {}", name, table),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    BadIdentifier { name: String },
    NoColumns { table: String },
    DuplicateColumn { table: String, column: String },
    MultipleAutoIncrements { table: String },
    EmptyIndex { table: String, index: String },
    DuplicateIndex { table: String, index: String },
    UnknownIndexColumn { index: String, column: String },
    NoForwardChanges,
    NoBackwardChanges,
}

impl Display for SchemaViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaViolation::BadIdentifier { name } => {
                write!(f, "'{}' is not a valid identifier", name)
            }
            SchemaViolation::NoColumns { table } => write!(f, "table '{}' has no columns", table),
            SchemaViolation::DuplicateColumn { table, column } => {
                write!(f, "column '{}' is defined twice in table '{}'", column, table)
            }
            SchemaViolation::MultipleAutoIncrements { table } => write!(
                f,
                "table '{}' has more than one auto-incrementing column",
                table
            ),
            SchemaViolation::EmptyIndex { table, index } => {
                write!(f, "index '{}' on '{}' names no columns", index, table)
            }
            SchemaViolation::DuplicateIndex { table, index } => {
                write!(f, "index '{}' is defined twice on table '{}'", index, table)
            }
            SchemaViolation::UnknownIndexColumn { index, column } => {
                write!(f, "index '{}' refers to unknown column '{}'", index, column)
            }
            SchemaViolation::NoForwardChanges => write!(f, "migration has no forward changes"),
            SchemaViolation::NoBackwardChanges => write!(f, "migration has no backward changes"),
        }
    }
}
