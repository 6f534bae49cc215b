//! Per-run logging.
//!
//! A [`LogSession`] owns its own subscriber instead of installing a global
//! one: the run executes inside [`LogSession::scope`], and dropping the
//! session flushes the log file.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Extension of daily log files (`YYYY-MM-DD.log`).
const LOG_SUFFIX: &str = "log";

/// Logger for one run: console plus a daily log file.
pub struct LogSession {
    dispatch: Dispatch,
    log_dir: PathBuf,
    _guard: WorkerGuard,
}

impl LogSession {
    /// Creates the logger, writing to stderr and to `<log_dir>/<date>.log`.
    ///
    /// `RUST_LOG` takes precedence over `verbosity` when set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Logging`] if the log directory or file cannot be created.
    pub fn new(log_dir: &Path, verbosity: u8) -> Result<Self> {
        fs::create_dir_all(log_dir).map_err(|e| Error::logging(log_dir, e))?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_suffix(LOG_SUFFIX)
            .build(log_dir)
            .map_err(|e| Error::logging(log_dir, e))?;
        let (file_writer, guard) = tracing_appender::non_blocking(appender);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(verbosity))
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(file_writer),
            );

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            log_dir: log_dir.to_path_buf(),
            _guard: guard,
        })
    }

    /// Runs `f` with this session as the active logger.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Returns the directory holding the log files.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbosity {
        0 => EnvFilter::new("docmerge=info"),
        1 => EnvFilter::new("docmerge=debug"),
        _ => EnvFilter::new("docmerge=trace"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_writes_daily_log_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let log_dir = temp.path().join("logs");

        let session = LogSession::new(&log_dir, 0).unwrap();
        session.scope(|| tracing::info!("generated 1_Alice.docx"));
        assert_eq!(session.log_dir(), log_dir.as_path());
        drop(session);

        let logs: Vec<_> = fs::read_dir(&log_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(logs.len(), 1);

        let name = logs[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "YYYY-MM-DD.log".len());

        let content = fs::read_to_string(&logs[0]).unwrap();
        assert!(content.contains("INFO"));
        assert!(content.contains("generated 1_Alice.docx"));
        assert!(!content.contains('\u{1b}'));
    }

    #[test]
    fn test_session_fails_when_log_dir_is_a_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.path().join("logs");
        fs::write(&file, b"x").unwrap();

        assert!(LogSession::new(&file, 0).is_err());
    }
}
