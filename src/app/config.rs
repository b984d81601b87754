use crate::migrate::errors::{Error, OpenDatabase, ReadConfig, Result};
use rusqlite::Connection;
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uclicious::{Priority, Uclicious, DEFAULT_DUPLICATE_STRATEGY};

#[derive(Uclicious, Clone, Debug)]
#[ucl(skip_builder)]
pub struct Database {
    pub path: PathBuf,
    #[ucl(default = "::std::time::Duration::from_secs(5)")]
    pub busy_timeout: Duration,
}

impl Database {
    pub fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).context(OpenDatabase { path: &self.path })?;
        conn.busy_timeout(self.busy_timeout)
            .context(OpenDatabase { path: &self.path })?;
        Ok(conn)
    }
}

/// Where log records go. With every sink disabled they are discarded.
#[derive(Uclicious, Clone, Debug, Default)]
#[ucl(skip_builder)]
pub struct Logging {
    #[ucl(default)]
    pub terminal: TerminalSink,
    #[ucl(default)]
    pub syslog: Option<SyslogSink>,
}

/// Human-readable records on stderr, so stdout stays free for command output.
#[derive(Uclicious, Clone, Debug)]
#[ucl(skip_builder)]
pub struct TerminalSink {
    #[ucl(default = "true")]
    pub enabled: bool,
    #[ucl(default = "\"INFO\".to_string()")]
    pub level: String,
}

impl Default for TerminalSink {
    fn default() -> Self {
        TerminalSink {
            enabled: true,
            level: "INFO".to_string(),
        }
    }
}

#[derive(Uclicious, Clone, Debug)]
#[ucl(skip_builder)]
pub struct SyslogSink {
    #[ucl(default = "false")]
    pub enabled: bool,
    #[ucl(default = "\"INFO\".to_string()")]
    pub level: String,
    /// Unix socket of the local syslog daemon.
    #[ucl(default = "::std::path::PathBuf::from(\"/var/run/log\")")]
    pub socket: PathBuf,
}

#[derive(Uclicious, Clone, Debug)]
pub struct Configuration {
    pub database: Database,
    #[ucl(default)]
    pub logging: Logging,
}

fn parse_error<E: std::fmt::Display>(e: E) -> Error {
    Error::ParseConfig {
        reason: e.to_string(),
    }
}

impl Configuration {
    pub fn from_chunk(input: &str) -> Result<Self> {
        let mut builder = Configuration::builder().map_err(parse_error)?;
        builder
            .add_chunk_full(input, Priority::default(), DEFAULT_DUPLICATE_STRATEGY)
            .map_err(parse_error)?;
        builder.build().map_err(parse_error)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path).context(ReadConfig { path })?;
        Self::from_chunk(&input)
    }

    /// Default configuration pointing at `path`.
    pub fn for_database(path: &Path) -> Result<Self> {
        let input = format!("database {{ path = {:?}; }}", path.to_string_lossy());
        Self::from_chunk(&input)
    }
}
