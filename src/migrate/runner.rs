use crate::migrate::descriptor::Migration;
use crate::migrate::errors::{self, Cancelled, Result, StatementExecution};
use crate::migrate::ledger::{self, LedgerEntry};
use crate::migrate::registry::Registry;
use crate::migrate::schema::SchemaChange;
use crate::migrate::sql::{SchemaBackend, SqliteBackend};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use slog::{debug, error, info, o, warn, Logger};
use snafu::ResultExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How much of the ledger `migrate_down` rolls back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollback {
    /// Every migration of the most recent batch.
    LastBatch,
    /// The given number of most recently applied migrations.
    Steps(usize),
}

impl Default for Rollback {
    fn default() -> Self {
        Rollback::LastBatch
    }
}

/// A migration and the SQL it would run in one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub id: String,
    pub statements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    /// Batch the run applied or reverted, `None` when nothing was done.
    pub batch: Option<i64>,
    /// Migration ids in the order they were executed.
    pub migrations: Vec<String>,
}

impl RunReport {
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Applied {
        batch: i64,
        applied_at: DateTime<Utc>,
    },
    /// Recorded in the ledger but no longer registered.
    Missing {
        batch: i64,
        applied_at: DateTime<Utc>,
    },
}

impl MigrationState {
    pub fn label(&self) -> &'static str {
        match self {
            MigrationState::Pending => "pending",
            MigrationState::Applied { .. } => "applied",
            MigrationState::Missing { .. } => "missing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub id: String,
    pub state: MigrationState,
}

/// Applies and reverts registered migrations against an injected connection.
///
/// Every migration runs in its own transaction together with its ledger
/// update. A whole run is guarded by the migration lock.
pub struct Runner<B = SqliteBackend> {
    registry: Registry,
    backend: B,
    logger: Logger,
    holder: String,
    cancelled: Arc<AtomicBool>,
}

impl Runner<SqliteBackend> {
    pub fn new(registry: Registry, logger: &Logger) -> Self {
        Self::with_backend(registry, SqliteBackend, logger)
    }
}

impl<B: SchemaBackend> Runner<B> {
    pub fn with_backend(registry: Registry, backend: B, logger: &Logger) -> Self {
        Runner {
            registry,
            backend,
            logger: logger.new(o!("module" => module_path!())),
            holder: format!("{}@pid-{}", crate::SERVICE, std::process::id()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Identifies this runner in the lock table.
    pub fn with_holder<S: Into<String>>(mut self, holder: S) -> Self {
        self.holder = holder.into();
        self
    }

    /// Shares an externally owned cancellation flag, e.g. one set by a
    /// signal handler.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Flag that stops a run before its next migration once set.
    pub fn cancellation(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    fn render(&self, changes: &[SchemaChange]) -> Vec<String> {
        changes.iter().map(|c| self.backend.render(c)).collect()
    }

    /// Ledger entries, or none at all when the ledger was never created.
    fn recorded(&self, conn: &Connection) -> Result<Vec<LedgerEntry>> {
        if ledger::exists(conn)? {
            ledger::applied(conn)
        } else {
            Ok(Vec::new())
        }
    }

    fn pending(&self, conn: &Connection) -> Result<Vec<&Migration>> {
        let applied: HashSet<String> = self
            .recorded(conn)?
            .into_iter()
            .map(|entry| entry.migration_id().clone())
            .collect();
        Ok(self
            .registry
            .list()
            .iter()
            .filter(|m| !applied.contains(m.id()))
            .collect())
    }

    /// Ledger entries to revert, most recent first.
    fn rollback_targets(
        &self,
        conn: &Connection,
        rollback: Rollback,
    ) -> Result<Vec<(LedgerEntry, &Migration)>> {
        let mut entries = self.recorded(conn)?;
        entries.reverse();
        let entries: Vec<LedgerEntry> = match rollback {
            Rollback::LastBatch => {
                let last = entries.first().map(|e| *e.batch());
                entries
                    .into_iter()
                    .take_while(|e| Some(*e.batch()) == last)
                    .collect()
            }
            Rollback::Steps(n) => entries.into_iter().take(n).collect(),
        };
        let mut targets = Vec::with_capacity(entries.len());
        for entry in entries {
            let migration = self.registry.find(entry.migration_id())?;
            targets.push((entry, migration));
        }
        Ok(targets)
    }

    /// Forward statements that `migrate_up` would execute. Writes nothing,
    /// not even the ledger tables.
    pub fn plan_up(&self, conn: &Connection) -> Result<Vec<PlannedStep>> {
        Ok(self
            .pending(conn)?
            .into_iter()
            .map(|m| PlannedStep {
                id: m.id().to_string(),
                statements: self.render(m.apply()),
            })
            .collect())
    }

    pub fn plan_down(&self, conn: &Connection, rollback: Rollback) -> Result<Vec<PlannedStep>> {
        Ok(self
            .rollback_targets(conn, rollback)?
            .into_iter()
            .map(|(_, m)| PlannedStep {
                id: m.id().to_string(),
                statements: self.render(m.revert()),
            })
            .collect())
    }

    pub fn status(&self, conn: &Connection) -> Result<Vec<MigrationStatus>> {
        let mut recorded: BTreeMap<String, LedgerEntry> = self
            .recorded(conn)?
            .into_iter()
            .map(|e| (e.migration_id().clone(), e))
            .collect();

        let mut statuses: Vec<MigrationStatus> = self
            .registry
            .list()
            .iter()
            .map(|m| {
                let state = match recorded.remove(m.id()) {
                    Some(entry) => MigrationState::Applied {
                        batch: *entry.batch(),
                        applied_at: *entry.applied_at(),
                    },
                    None => MigrationState::Pending,
                };
                MigrationStatus {
                    id: m.id().to_string(),
                    state,
                }
            })
            .collect();
        statuses.extend(recorded.into_iter().map(|(id, entry)| MigrationStatus {
            id,
            state: MigrationState::Missing {
                batch: *entry.batch(),
                applied_at: *entry.applied_at(),
            },
        }));
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(statuses)
    }

    /// Drops a lock left behind by a crashed run.
    pub fn unlock(&self, conn: &Connection) -> Result<bool> {
        if !ledger::exists(conn)? {
            return Ok(false);
        }
        let removed = ledger::force_release_lock(conn)?;
        if removed {
            warn!(self.logger, "Force-released the migration lock");
        }
        Ok(removed)
    }

    pub fn migrate_up(&self, conn: &mut Connection) -> Result<RunReport> {
        ledger::bootstrap(conn)?;
        self.locked(conn, |conn| {
            let pending = self.pending(conn)?;
            if pending.is_empty() {
                info!(self.logger, "Nothing to migrate");
                return Ok(RunReport::default());
            }

            let batch = ledger::last_batch(conn)? + 1;
            info!(self.logger, "Applying {} migration(s)", pending.len(); "batch" => batch);
            let mut report = RunReport {
                batch: Some(batch),
                migrations: Vec::with_capacity(pending.len()),
            };
            for (idx, migration) in pending.iter().enumerate() {
                self.check_cancelled(&report)?;
                let not_attempted = pending.len() - idx - 1;
                self.apply_one(conn, migration, batch, not_attempted)?;
                report.migrations.push(migration.id().to_string());
            }
            info!(self.logger, "Migrated up"; "batch" => batch, "count" => report.migrations.len());
            Ok(report)
        })
    }

    pub fn migrate_down(&self, conn: &mut Connection, rollback: Rollback) -> Result<RunReport> {
        ledger::bootstrap(conn)?;
        self.locked(conn, |conn| {
            let targets = self.rollback_targets(conn, rollback)?;
            if targets.is_empty() {
                info!(self.logger, "Nothing to roll back");
                return Ok(RunReport::default());
            }

            info!(self.logger, "Reverting {} migration(s)", targets.len(); "rollback" => ?rollback);
            let mut report = RunReport {
                batch: targets.first().map(|(entry, _)| *entry.batch()),
                migrations: Vec::with_capacity(targets.len()),
            };
            for (idx, (_, migration)) in targets.iter().enumerate() {
                self.check_cancelled(&report)?;
                let not_attempted = targets.len() - idx - 1;
                self.revert_one(conn, migration, not_attempted)?;
                report.migrations.push(migration.id().to_string());
            }
            info!(self.logger, "Migrated down"; "count" => report.migrations.len());
            Ok(report)
        })
    }

    fn check_cancelled(&self, report: &RunReport) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            let last_committed = report.migrations.last().cloned();
            warn!(self.logger, "Run cancelled";
                  "last_committed" => last_committed.as_deref().unwrap_or("none"));
            return Cancelled { last_committed }.fail();
        }
        Ok(())
    }

    fn locked<T, F>(&self, conn: &mut Connection, run: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        ledger::acquire_lock(conn, &self.holder, Utc::now())?;
        debug!(self.logger, "Acquired migration lock"; "holder" => &self.holder);

        let result = run(&mut *conn);

        match (ledger::release_lock(conn, &self.holder), result) {
            (Ok(released), result) => {
                if !released {
                    warn!(self.logger, "Migration lock was gone before release"; "holder" => &self.holder);
                }
                result
            }
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(run_error)) => {
                error!(self.logger, "Failed to release migration lock: {}", e);
                Err(run_error)
            }
        }
    }

    fn apply_one(
        &self,
        conn: &mut Connection,
        migration: &Migration,
        batch: i64,
        not_attempted: usize,
    ) -> Result<()> {
        let id = migration.id();
        info!(self.logger, "Applying migration"; "migration" => id);
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context(errors::Transaction { id, action: "begin" })?;

        for statement in self.render(migration.apply()) {
            debug!(self.logger, "{}", statement; "migration" => id);
            if let Err(e) = tx.execute_batch(&statement) {
                error!(self.logger, "Statement failed, rolling back: {}", e; "migration" => id);
                return Err(e).context(StatementExecution {
                    id,
                    statement,
                    not_attempted,
                });
            }
        }
        ledger::mark_applied(&tx, id, batch, Utc::now())?;

        tx.commit()
            .context(errors::Transaction { id, action: "commit" })?;
        Ok(())
    }

    fn revert_one(
        &self,
        conn: &mut Connection,
        migration: &Migration,
        not_attempted: usize,
    ) -> Result<()> {
        let id = migration.id();
        info!(self.logger, "Reverting migration"; "migration" => id);
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context(errors::Transaction { id, action: "begin" })?;

        for statement in self.render(migration.revert()) {
            debug!(self.logger, "{}", statement; "migration" => id);
            if let Err(e) = tx.execute_batch(&statement) {
                error!(self.logger, "Statement failed, rolling back: {}", e; "migration" => id);
                return Err(e).context(StatementExecution {
                    id,
                    statement,
                    not_attempted,
                });
            }
        }
        ledger::mark_reverted(&tx, id)?;

        tx.commit()
            .context(errors::Transaction { id, action: "commit" })?;
        Ok(())
    }
}
