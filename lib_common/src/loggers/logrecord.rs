use serde::{Deserialize, Serialize};

use crate::core::{RunContext, WriteMode};
use crate::utils::misc::sys_info::host_name;
use crate::utils::misc::utils::current_datetime_rfc9557;

/// # Governance Record
///
/// Who wrote what, where, and when. One record is logged after each
/// successful data upload and travels with the run's log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceRecord {
    /// Component that performed the upload.
    pub uploaded_by: String,
    /// Host the run executed on.
    pub host: String,
    /// Task name of the run.
    pub task: String,
    /// Environment of the run.
    pub environment: String,
    /// Destination bucket.
    pub bucket: String,
    /// Destination key.
    pub path: String,
    /// Write mode used.
    pub mode: WriteMode,
    /// Rows contributed by this run.
    pub rows: usize,
    /// Rows in the object after the write.
    pub total_rows: usize,
    /// Column names of the written table.
    pub columns: Vec<String>,
    /// Attempt on which the data upload succeeded (1-based).
    pub attempt: u32,
    /// RFC 9557 formatted timestamp string.
    pub rfc9557: String,
}

impl GovernanceRecord {
    /// Stamps a record with the current host and time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        uploaded_by: &str,
        run: &RunContext,
        bucket: &str,
        path: &str,
        mode: WriteMode,
        rows: usize,
        total_rows: usize,
        columns: Vec<String>,
        attempt: u32,
    ) -> Self {
        Self {
            uploaded_by: uploaded_by.to_string(),
            host: host_name(),
            task: run.task_name.clone(),
            environment: run.environment.clone(),
            bucket: bucket.to_string(),
            path: path.to_string(),
            mode,
            rows,
            total_rows,
            columns,
            attempt,
            rfc9557: current_datetime_rfc9557(),
        }
    }

    /// Compact JSON form, as embedded in log events.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}
