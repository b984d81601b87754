//! Applied-state ledger and the advisory migration lock.
//!
//! Both live in the migrated database itself. Functions take a `Connection`
//! so that callers can pass a `Transaction` and keep the ledger write in the
//! same unit of work as the schema change.
use crate::db::ledger_schema;
use crate::migrate::errors::{Error, LedgerAccess, LockUnavailable, NotFound, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use getset::Getters;
use rusqlite::ffi::ErrorCode;
use rusqlite::{params, Connection, OptionalExtension, Row, NO_PARAMS};
use snafu::ResultExt;

#[derive(Getters, Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    #[get = "pub"]
    migration_id: String,
    #[get = "pub"]
    batch: i64,
    #[get = "pub"]
    applied_at: DateTime<Utc>,
}

#[derive(Getters, Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    #[get = "pub"]
    holder: String,
    #[get = "pub"]
    acquired_at: DateTime<Utc>,
}

/// Creates the ledger and lock tables if they are missing.
pub fn bootstrap(conn: &mut Connection) -> Result<()> {
    ledger_schema::runner()
        .run(conn)
        .map_err(|e| Error::Bootstrap {
            reason: e.to_string(),
        })
}

/// Whether the ledger table has been created yet. Read-only callers use this
/// instead of `bootstrap` and treat a missing ledger as empty.
pub fn exists(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![ledger_schema::LEDGER_TABLE],
            |row| row.get(0),
        )
        .context(LedgerAccess)?;
    Ok(count > 0)
}

// Fixed width, so text order is time order.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let applied_at: String = row.get(2)?;
    Ok(LedgerEntry {
        migration_id: row.get(0)?,
        batch: row.get(1)?,
        applied_at: parse_timestamp(2, &applied_at)?,
    })
}

/// All entries in application order: batch, then time, then id.
pub fn applied(conn: &Connection) -> Result<Vec<LedgerEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT migration_id, batch, applied_at FROM schema_migrations \
             ORDER BY batch ASC, applied_at ASC, migration_id ASC",
        )
        .context(LedgerAccess)?;
    let rows = stmt.query_map(NO_PARAMS, entry_from_row).context(LedgerAccess)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context(LedgerAccess)
}

pub fn is_applied(conn: &Connection, id: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE migration_id = ?1",
            params![id],
            |row| row.get(0),
        )
        .context(LedgerAccess)?;
    Ok(count > 0)
}

/// Highest batch number recorded, 0 for an empty ledger.
pub fn last_batch(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(batch), 0) FROM schema_migrations",
        NO_PARAMS,
        |row| row.get(0),
    )
    .context(LedgerAccess)
}

pub(crate) fn mark_applied(
    conn: &Connection,
    id: &str,
    batch: i64,
    at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (migration_id, batch, applied_at) VALUES (?1, ?2, ?3)",
        params![id, batch, format_timestamp(at)],
    )
    .context(LedgerAccess)?;
    Ok(())
}

pub(crate) fn mark_reverted(conn: &Connection, id: &str) -> Result<()> {
    let removed = conn
        .execute(
            "DELETE FROM schema_migrations WHERE migration_id = ?1",
            params![id],
        )
        .context(LedgerAccess)?;
    if removed == 0 {
        return NotFound { id }.fail();
    }
    Ok(())
}

pub fn current_lock(conn: &Connection) -> Result<Option<LockHolder>> {
    conn.query_row(
        "SELECT holder, acquired_at FROM schema_migration_lock WHERE id = 1",
        NO_PARAMS,
        |row| {
            let acquired_at: String = row.get(1)?;
            Ok(LockHolder {
                holder: row.get(0)?,
                acquired_at: parse_timestamp(1, &acquired_at)?,
            })
        },
    )
    .optional()
    .context(LedgerAccess)
}

/// Takes the migration lock. Runs outside any transaction so other
/// connections see it immediately.
pub(crate) fn acquire_lock(conn: &Connection, holder: &str, at: DateTime<Utc>) -> Result<()> {
    let inserted = conn.execute(
        "INSERT INTO schema_migration_lock (id, holder, acquired_at) VALUES (1, ?1, ?2)",
        params![holder, format_timestamp(at)],
    );
    match inserted {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            match current_lock(conn)? {
                Some(current) => LockUnavailable {
                    holder: current.holder,
                    acquired_at: format_timestamp(current.acquired_at),
                }
                .fail(),
                None => LockUnavailable {
                    holder: "unknown",
                    acquired_at: "an unknown time",
                }
                .fail(),
            }
        }
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked =>
        {
            LockUnavailable {
                holder: "another connection",
                acquired_at: "an unknown time",
            }
            .fail()
        }
        Err(e) => Err(e).context(LedgerAccess),
    }
}

/// Releases the lock if `holder` owns it. Returns whether a lock was removed.
pub(crate) fn release_lock(conn: &Connection, holder: &str) -> Result<bool> {
    let removed = conn
        .execute(
            "DELETE FROM schema_migration_lock WHERE id = 1 AND holder = ?1",
            params![holder],
        )
        .context(LedgerAccess)?;
    Ok(removed > 0)
}

/// Removes the lock regardless of who holds it.
pub fn force_release_lock(conn: &Connection) -> Result<bool> {
    let removed = conn
        .execute("DELETE FROM schema_migration_lock WHERE id = 1", NO_PARAMS)
        .context(LedgerAccess)?;
    Ok(removed > 0)
}
