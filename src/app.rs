pub mod cli;
pub mod config;
pub mod logging;

use crate::migrate::errors::{Error, Result};
use crate::migrate::{MigrationState, MigrationStatus, PlannedStep, Rollback, RunReport, Runner};
use cli::{Cli, Command};
use config::Configuration;
use logging::GlobalLogger as Log;
use slog::{info, o, warn};
use std::fmt::Write;
use std::sync::atomic::Ordering;

fn load_configuration(cli: &Cli) -> Result<Configuration> {
    match (&cli.config, &cli.database) {
        (Some(path), database) => {
            let mut conf = Configuration::load(path)?;
            if let Some(database) = database {
                conf.database.path = database.clone();
            }
            Ok(conf)
        }
        (None, Some(database)) => Configuration::for_database(database),
        (None, None) => Err(Error::ParseConfig {
            reason: "either --config or --database is required".to_string(),
        }),
    }
}

/// Entry point of the `migrate` binary.
pub fn run(cli: Cli) -> Result<()> {
    let conf = load_configuration(&cli)?;
    logging::setup_root_logger(&conf);
    let log = Log::get().new(o!("module" => module_path!()));
    let _std_log = logging::forward_std_log(&log);

    info!(log, "Opening database"; "path" => %conf.database.path.display());
    let mut conn = conf.database.open()?;
    let runner = Runner::new(crate::db::migrations::registry()?, &log);

    let cancel = runner.cancellation();
    if let Err(e) = ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst)) {
        warn!(log, "Failed to install Ctrl-C handler: {}", e);
    }

    let output = match cli.command {
        Command::Up { dry_run: true } => render_plan(&runner.plan_up(&conn)?),
        Command::Up { dry_run: false } => render_report("Applied", &runner.migrate_up(&mut conn)?),
        Command::Down { steps, dry_run } => {
            let rollback = steps.map(Rollback::Steps).unwrap_or_default();
            if dry_run {
                render_plan(&runner.plan_down(&conn, rollback)?)
            } else {
                render_report("Reverted", &runner.migrate_down(&mut conn, rollback)?)
            }
        }
        Command::Status => render_status(&runner.status(&conn)?),
        Command::Unlock => {
            if runner.unlock(&conn)? {
                "Migration lock released.\n".to_string()
            } else {
                "No migration lock was held.\n".to_string()
            }
        }
    };
    print!("{}", output);
    Ok(())
}

pub fn render_plan(plan: &[PlannedStep]) -> String {
    if plan.is_empty() {
        return "Nothing to do.\n".to_string();
    }
    let mut out = String::new();
    for step in plan {
        let _ = writeln!(out, "-- {}", step.id);
        for statement in &step.statements {
            let _ = writeln!(out, "{}", statement);
        }
    }
    out
}

pub fn render_report(verb: &str, report: &RunReport) -> String {
    let batch = match report.batch {
        Some(batch) => batch,
        None => return "Nothing to do.\n".to_string(),
    };
    let mut out = format!(
        "{} {} migration(s) from batch {}:\n",
        verb,
        report.migrations.len(),
        batch
    );
    for id in &report.migrations {
        let _ = writeln!(out, "  {}", id);
    }
    out
}

pub fn render_status(statuses: &[MigrationStatus]) -> String {
    let mut out = String::new();
    for status in statuses {
        match &status.state {
            MigrationState::Pending => {
                let _ = writeln!(out, "{:<8} {}", status.state.label(), status.id);
            }
            MigrationState::Applied { batch, applied_at }
            | MigrationState::Missing { batch, applied_at } => {
                let _ = writeln!(
                    out,
                    "{:<8} {} (batch {}, {})",
                    status.state.label(),
                    status.id,
                    batch,
                    applied_at.to_rfc3339()
                );
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    #[test]
    fn empty_results_say_nothing_to_do() {
        assert_eq!(render_plan(&[]), "Nothing to do.\n");
        assert_eq!(render_report("Applied", &RunReport::default()), "Nothing to do.\n");
    }

    #[test]
    fn report_lists_migrations() {
        let report = RunReport {
            batch: Some(3),
            migrations: vec!["0001_a".to_string(), "0002_b".to_string()],
        };
        assert_eq!(
            render_report("Applied", &report),
            "Applied 2 migration(s) from batch 3:\n  0001_a\n  0002_b\n"
        );
    }

    #[test]
    fn plan_prints_statements_under_ids() {
        let plan = vec![PlannedStep {
            id: "0001_a".to_string(),
            statements: vec!["DROP TABLE \"a\";".to_string()],
        }];
        assert_eq!(render_plan(&plan), "-- 0001_a\nDROP TABLE \"a\";\n");
    }

    #[test]
    fn status_lines() {
        let at = Utc.ymd(2015, 3, 7).and_hms(10, 0, 0);
        let statuses = vec![
            MigrationStatus {
                id: "0001_a".to_string(),
                state: MigrationState::Applied {
                    batch: 1,
                    applied_at: at,
                },
            },
            MigrationStatus {
                id: "0002_b".to_string(),
                state: MigrationState::Pending,
            },
        ];
        assert_eq!(
            render_status(&statuses),
            "applied  0001_a (batch 1, 2015-03-07T10:00:00+00:00)\npending  0002_b\n"
        );
    }

    #[test]
    fn configuration_needs_a_source() {
        let cli = Cli {
            config: None,
            database: None,
            command: Command::Status,
        };
        assert!(matches!(
            load_configuration(&cli),
            Err(Error::ParseConfig { .. })
        ));

        let cli = Cli {
            config: None,
            database: Some(PathBuf::from("/tmp/tracker.sqlite3")),
            command: Command::Status,
        };
        let conf = load_configuration(&cli).unwrap();
        assert_eq!(conf.database.path, PathBuf::from("/tmp/tracker.sqlite3"));
    }
}
