use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "migrate", version, about = "Apply and roll back schema migrations")]
pub struct Cli {
    /// UCL configuration file.
    #[arg(short, long, env = "TIDEMARK_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database, overrides `database.path` from the configuration.
    #[arg(short, long, env = "TIDEMARK_DATABASE")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Apply every pending migration as one batch.
    Up {
        /// Print the statements instead of executing them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Roll back the last batch, or the last N migrations.
    Down {
        #[arg(long)]
        steps: Option<usize>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Show which migrations are applied.
    Status,
    /// Remove a migration lock left behind by a crashed run.
    Unlock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_down_with_steps() {
        let cli = Cli::try_parse_from(["migrate", "--database", "t.sqlite3", "down", "--steps", "2"])
            .unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("t.sqlite3")));
        assert_eq!(
            cli.command,
            Command::Down {
                steps: Some(2),
                dry_run: false
            }
        );
    }

    #[test]
    fn parses_up_dry_run_and_status() {
        let cli = Cli::try_parse_from(["migrate", "-c", "tidemark.conf", "up", "--dry-run"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("tidemark.conf")));
        assert_eq!(cli.command, Command::Up { dry_run: true });
        let cli = Cli::try_parse_from(["migrate", "status"]).unwrap();
        assert_eq!(cli.command, Command::Status);
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["migrate"]).is_err());
    }
}
