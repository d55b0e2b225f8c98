//! Subscriber setup for the resident launcher and the short-lived commands
//! that talk to it.

use crate::{config::LoggingConfig, paths::AppDirs};
use std::io::IsTerminal;
use std::path::PathBuf;
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::{FromEnvError, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, EnvFilter};

/// Overrides the configured level in every mode, e.g. `DLAUNCH_LOG=debug`.
pub const LOG_ENV: &str = "DLAUNCH_LOG";

const DEFAULT_FILE_NAME: &str = "dlaunch.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// `dlaunch run`: daily rolling file, mirrored to stderr when configured.
    Resident,
    /// `show`, `hide`, `quit` and friends, often fired from a hotkey. They
    /// never touch the log directory and only report warnings.
    OneShot,
    /// Commands whose stdout is read by another program.
    Quiet,
}

impl LogMode {
    fn ceiling(self) -> LevelFilter {
        match self {
            LogMode::Resident => LevelFilter::TRACE,
            LogMode::OneShot => LevelFilter::WARN,
            LogMode::Quiet => LevelFilter::ERROR,
        }
    }
}

/// Keeps the file writer's worker alive; drop it last.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init_logging(
    config: &LoggingConfig,
    dirs: &AppDirs,
    mode: LogMode,
) -> Result<LoggingGuard, LoggingError> {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level(config, mode).into())
        .with_env_var(LOG_ENV)
        .from_env()
        .map_err(|source| LoggingError::Filter { source })?;

    let (file_layer, file_guard) = if mode == LogMode::Resident {
        let (writer, guard) = file_writer(config, dirs)?;
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let stderr_layer = (mode != LogMode::Resident || config.stderr).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(LoggingError::SubscriberInstall)?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// The configured level, capped by what the mode is allowed to print.
fn default_level(config: &LoggingConfig, mode: LogMode) -> LevelFilter {
    config.level.as_level_filter().min(mode.ceiling())
}

/// Daily files in the log dir; the appender prunes beyond `max_log_files`
/// when it rotates.
fn file_writer(
    config: &LoggingConfig,
    dirs: &AppDirs,
) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let log_dir = dirs.log_dir();
    std::fs::create_dir_all(log_dir).map_err(|source| LoggingError::CreateDirectory {
        path: log_dir.to_path_buf(),
        source,
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(config.file_name.as_deref().unwrap_or(DEFAULT_FILE_NAME))
        .max_log_files(config.max_log_files.max(1))
        .build(log_dir)
        .map_err(|source| LoggingError::Appender {
            path: log_dir.to_path_buf(),
            source,
        })?;
    Ok(tracing_appender::non_blocking(appender))
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid {LOG_ENV} filter: {source}")]
    Filter { source: FromEnvError },
    #[error("failed to open log file in {path}: {source}")]
    Appender { path: PathBuf, source: InitError },
    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInstall(TryInitError),
}
