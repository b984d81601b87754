use crate::migrate::schema::SchemaViolation;
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Invalid schema in migration '{}': {}", id, violation))]
    InvalidSchema { id: String, violation: SchemaViolation },

    #[snafu(display("Migration id '{}' is registered more than once", id))]
    RegistryConflict { id: String },

    #[snafu(display("Migration '{}' is not registered", id))]
    NotFound { id: String },

    #[snafu(display(
        "Migration '{}' failed executing `{}`: {}. {} later migration(s) were not attempted",
        id,
        statement,
        source,
        not_attempted
    ))]
    StatementExecution {
        id: String,
        statement: String,
        not_attempted: usize,
        source: rusqlite::Error,
    },

    #[snafu(display("Migration lock is held by '{}' since {}", holder, acquired_at))]
    LockUnavailable { holder: String, acquired_at: String },

    #[snafu(display("Failed to {} transaction for migration '{}': {}", action, id, source))]
    Transaction {
        id: String,
        action: &'static str,
        source: rusqlite::Error,
    },

    #[snafu(display("Failed to access the migration ledger: {}", source))]
    LedgerAccess { source: rusqlite::Error },

    #[snafu(display("Failed to prepare the migration ledger tables: {}", reason))]
    Bootstrap { reason: String },

    #[snafu(display(
        "Run cancelled, last committed migration: {}",
        last_committed.as_deref().unwrap_or("none")
    ))]
    Cancelled { last_committed: Option<String> },

    #[snafu(display("Failed to open database at '{}': {}", path.display(), source))]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[snafu(display("Failed to read configuration from '{}': {}", path.display(), source))]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid configuration: {}", reason))]
    ParseConfig { reason: String },
}

impl Error {
    /// Id of the migration this error is about, if any.
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            Error::InvalidSchema { id, .. }
            | Error::RegistryConflict { id }
            | Error::NotFound { id }
            | Error::StatementExecution { id, .. }
            | Error::Transaction { id, .. } => Some(id),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
