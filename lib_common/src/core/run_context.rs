use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

/// # Run Context
///
/// The identity of a single pipeline invocation.
///
/// All time-derived names (the local log file and its remote key) are computed
/// from `started_at`, which is captured once when the context is built. The
/// logger and the uploader both receive the same context, so the file that is
/// written locally is the file that gets shipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunContext {
    /// Logical task name, used in log file names and remote log keys.
    pub task_name: String,
    /// Deployment environment (e.g. `development`, `production`).
    pub environment: String,
    /// Local wall-clock time at which the run started.
    pub started_at: DateTime<Local>,
    /// Directory that receives the run's local log file.
    pub log_dir: PathBuf,
    /// Directory that receives scratch Parquet files before upload.
    pub scratch_dir: PathBuf,
}

impl RunContext {
    /// Creates a context stamped with the current local time.
    pub fn new(
        task_name: impl Into<String>,
        environment: impl Into<String>,
        log_dir: impl Into<PathBuf>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::with_start(task_name, environment, log_dir, scratch_dir, Local::now())
    }

    /// Creates a context with an explicit start time.
    pub fn with_start(
        task_name: impl Into<String>,
        environment: impl Into<String>,
        log_dir: impl Into<PathBuf>,
        scratch_dir: impl Into<PathBuf>,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            environment: environment.into(),
            started_at,
            log_dir: log_dir.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Run date as `YYYY-MM-DD`.
    pub fn date_str(&self) -> String {
        self.started_at.format("%Y-%m-%d").to_string()
    }

    /// Run time as `HHMMSS`.
    pub fn time_str(&self) -> String {
        self.started_at.format("%H%M%S").to_string()
    }

    /// `{task}_{HHMMSS}.log`
    pub fn log_file_name(&self) -> String {
        format!("{}_{}.log", self.task_name, self.time_str())
    }

    /// Absolute path of the run's local log file.
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(self.log_file_name())
    }

    /// Object key the log file is shipped to:
    /// `logs/{environment}/{task}/{YYYY-MM-DD}/{task}_{HHMMSS}.log`.
    pub fn remote_log_key(&self) -> String {
        format!(
            "logs/{}/{}/{}/{}",
            self.environment,
            self.task_name,
            self.date_str(),
            self.log_file_name()
        )
    }

    /// Directory for scratch files.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }
}

impl fmt::Display for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RunContext
    Task: {},
    Environment: {},
    Started at: {},
    Log file: {},
    Remote log key: {},
    Scratch dir: {}
",
            self.task_name,
            self.environment,
            self.started_at.to_rfc3339(),
            self.log_file().display(),
            self.remote_log_key(),
            self.scratch_dir.display(),
        )
    }
}
