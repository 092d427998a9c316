use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

use crate::core::RunContext;

/// Errors raised while preparing run logging.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The log directory could not be created.
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    /// The level / `RUST_LOG` directive did not parse.
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// The log file could not be opened.
    #[error("Failed to open log file: {0}")]
    Appender(String),

    /// A global subscriber was already installed.
    #[error("Failed to install tracing subscriber: {0}")]
    Init(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
/// # Logger Local Options
///
/// Controls where run logs go.
pub struct LoggerLocalOptions {
    /// Print human-readable lines to the console.
    pub use_tty: bool,
    /// Append JSON lines to the run's log file.
    pub use_file: bool,
    /// Default filter directive when `RUST_LOG` is not set (e.g. `info`).
    pub level: String,
}

impl Default for LoggerLocalOptions {
    fn default() -> Self {
        Self {
            use_tty: true,
            use_file: true,
            level: "info".to_string(),
        }
    }
}

/// # Logger Local
///
/// The logging setup of one pipeline run.
///
/// The log file path is taken from the [`RunContext`], so the file written
/// here is exactly the one the uploader later ships to
/// `RunContext::remote_log_key`. File output is unbuffered: every event is on
/// disk by the time the upload reads the file.
#[derive(Debug, Clone)]
pub struct LoggerLocal {
    /// The task name the run logs under.
    app_name: String,
    /// Configuration options determining logging behavior.
    options: LoggerLocalOptions,
    /// The run's log file, if file logging is enabled.
    current_log_file: Option<PathBuf>,
}

impl LoggerLocal {
    /// Creates a logger for `run`.
    ///
    /// If file logging is enabled the run's log directory is created.
    pub fn new(run: &RunContext, options: Option<LoggerLocalOptions>) -> Result<Self, LoggerError> {
        let options = options.unwrap_or_default();

        let current_log_file = if options.use_file {
            std::fs::create_dir_all(&run.log_dir)?;
            Some(run.log_file())
        } else {
            None
        };

        Ok(Self {
            app_name: run.task_name.clone(),
            options,
            current_log_file,
        })
    }

    /// The run's log file, if file logging is enabled.
    pub fn current_log_file(&self) -> Option<&Path> {
        self.current_log_file.as_deref()
    }

    /// Builds the subscriber without installing it.
    ///
    /// `RUST_LOG` takes precedence over the configured level.
    pub fn subscriber(&self) -> Result<impl Subscriber + Send + Sync + 'static, LoggerError> {
        let env_filter: EnvFilter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.options.level))
            .map_err(|e| LoggerError::Filter(e.to_string()))?;

        let console_layer = self
            .options
            .use_tty
            .then(|| fmt::layer().with_target(true).with_ansi(true));

        let file_layer = match &self.current_log_file {
            Some(path) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Self::file_appender(path)?)
                    .json(),
            ),
            None => None,
        };

        Ok(tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer))
    }

    /// Installs the subscriber as the global default for the process.
    pub fn init(&self) -> Result<(), LoggerError> {
        let subscriber = self.subscriber()?;
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| LoggerError::Init(e.to_string()))?;

        tracing::info!(
            app = %self.app_name,
            level = %self.options.level,
            log_file = ?self.current_log_file,
            "Logging initialized"
        );
        Ok(())
    }

    fn file_appender(path: &Path) -> Result<RollingFileAppender, LoggerError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| LoggerError::Appender(format!("invalid log file path {}", path.display())))?;

        RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name)
            .build(dir)
            .map_err(|e| LoggerError::Appender(e.to_string()))
    }
}
