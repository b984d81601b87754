//! Process-wide slog logger for the `migrate` binary.
//!
//! Library code never reaches for the global; `Runner` takes a `Logger`
//! and derives its own child from it.
use crate::app::config::{Configuration, SyslogSink, TerminalSink};
use once_cell::sync::OnceCell;
use slog::{debug, error, o};
use slog::{Drain, Logger};
use slog_syslog::{Facility, Streamer3164};
use std::borrow::Borrow;
use std::ops::Deref;
use std::str::FromStr;

static GLOBAL_LOGGER: OnceCell<GlobalLogger> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct GlobalLogger {
    inner: Logger,
}

impl Deref for GlobalLogger {
    type Target = Logger;

    fn deref(&self) -> &Self::Target {
        self.inner.borrow()
    }
}

impl GlobalLogger {
    /// Panics unless `setup_root_logger` ran first.
    pub fn get() -> &'static GlobalLogger {
        GLOBAL_LOGGER
            .get()
            .expect("Trying to get GLOBAL_LOGGER before it was setup")
    }
}

/// Unknown level names log at info rather than failing startup.
fn parse_level(name: &str) -> slog::Level {
    slog::Level::from_str(name).unwrap_or(slog::Level::Info)
}

fn syslog_drain(sink: Option<&SyslogSink>) -> Option<slog::Fuse<Streamer3164>> {
    let sink = sink.filter(|s| s.enabled)?;
    slog_syslog::SyslogBuilder::new()
        .facility(Facility::LOG_USER)
        .level(parse_level(&sink.level))
        .unix(sink.socket.as_path())
        .start()
        .map(Drain::fuse)
        .ok()
}

fn terminal_drain(sink: &TerminalSink) -> Option<slog::Fuse<slog_async::Async>> {
    if !sink.enabled {
        return None;
    }
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let formatted = slog_term::FullFormat::new(decorator).build();
    let filtered = slog::LevelFilter::new(formatted, parse_level(&sink.level)).fuse();
    Some(slog_async::Async::new(filtered).build().fuse())
}

/// Builds the root logger from `config.logging` and installs it as the
/// global one. A second call keeps the first logger.
pub fn setup_root_logger(config: &Configuration) {
    let logging = &config.logging;
    let keys = o!("service" => crate::SERVICE, "tidemark_version" => crate::VERSION);

    let root_logger = match (
        terminal_drain(&logging.terminal),
        syslog_drain(logging.syslog.as_ref()),
    ) {
        (Some(term), Some(syslog)) => {
            Logger::root(slog::Duplicate::new(term, syslog).ignore_res(), keys)
        }
        (Some(term), None) => Logger::root(term, keys),
        (None, Some(syslog)) => Logger::root(syslog, keys),
        (None, None) => Logger::root(slog::Discard.fuse(), keys),
    };

    if GLOBAL_LOGGER
        .set(GlobalLogger {
            inner: root_logger.clone(),
        })
        .is_err()
    {
        error!(root_logger, "Root logger was already set up");
    }
}

/// Routes `log` records (refinery logs through it) into `logger`.
/// Forwarding stops when the returned guard is dropped.
pub fn forward_std_log(logger: &Logger) -> slog_scope::GlobalLoggerGuard {
    let guard = slog_scope::set_global_logger(logger.clone());
    match slog_stdlog::init() {
        Ok(()) => debug!(logger, "Installed stdlog backend"),
        Err(e) => error!(logger, "Failed to install stdlog backend: {}", e),
    };
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_level("DEBUG"), slog::Level::Debug);
        assert_eq!(parse_level("WARN"), slog::Level::Warning);
        assert_eq!(parse_level("loud"), slog::Level::Info);
    }

    #[test]
    fn disabled_sinks_build_no_drain() {
        let terminal = TerminalSink {
            enabled: false,
            level: "INFO".to_string(),
        };
        assert!(terminal_drain(&terminal).is_none());

        let syslog = SyslogSink {
            enabled: false,
            level: "INFO".to_string(),
            socket: "/var/run/log".into(),
        };
        assert!(syslog_drain(Some(&syslog)).is_none());
        assert!(syslog_drain(None).is_none());
    }
}
