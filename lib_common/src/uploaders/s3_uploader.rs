//! # S3 Uploader
//!
//! Appends (or overwrites) a Parquet table in object storage.
//!
//! ## Sequence of one `upload` call:
//! 1. Mask the configured PII columns (once, before any attempt).
//! 2. Append mode reads the current object and concatenates the new rows
//!    after it. A missing object means the new rows are the whole table.
//!    Overwrite mode skips the read.
//! 3. Write the target table to a uniquely named scratch file.
//! 4. Put the file at the target key. The put is conditional on the version
//!    read in step 2, or on absence if nothing was there.
//! 5. Log a governance record.
//! 6. Ship the run's log file to its remote key.
//!
//! Any failure in 2–6 is logged, followed by a fixed backoff, and the sequence
//! is retried up to `RetryPolicy::max_attempts` times. Once step 4 has
//! succeeded, later attempts only repeat step 6, so a failing log upload
//! cannot append the same batch twice. A failed precondition in step 4 means
//! someone else wrote the object in between; it is returned immediately.

use std::sync::Arc;
use std::time::Duration;

use arrow::record_batch::RecordBatch;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::core::{RunContext, WriteMode};
use crate::loggers::logrecord::GovernanceRecord;
use crate::storage::{StorageError, StorageManager, WriteCondition};
use crate::tables::{
    column_names, concat_tables, decode_parquet, mask_columns, write_parquet_file, TableError,
};

const UPLOADER_NAME: &str = "S3Uploader";

/// Errors surfaced by [`S3Uploader::upload`].
#[derive(Debug, Error)]
pub enum UploadError {
    /// Masking, merging or serializing the table failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// A remote read or write failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The scratch file could not be created.
    #[error("Scratch file error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Whether another attempt could succeed. Concurrent-writer conflicts are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, UploadError::Storage(StorageError::Conflict { .. }))
    }
}

/// Bounded, fixed-delay retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never less than 1.
    pub max_attempts: u32,
    /// Delay between consecutive attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Creates a policy, raising `max_attempts` to at least 1.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Location of the data object.
    pub data_url: String,
    /// Location of the shipped log file, if one was shipped.
    pub log_url: Option<String>,
    /// Rows contributed by this call.
    pub rows_uploaded: usize,
    /// Rows in the data object after the write.
    pub total_rows: usize,
    /// Column names of the data object after the write.
    pub columns: Vec<String>,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Data-upload result carried across attempts.
#[derive(Debug, Clone)]
struct DataUploaded {
    total_rows: usize,
    columns: Vec<String>,
}

/// # S3 Uploader
///
/// Bound to one storage handle for its whole lifetime.
#[derive(Debug, Clone)]
pub struct S3Uploader {
    storage: Arc<dyn StorageManager>,
    pii_columns: Vec<String>,
    retry: RetryPolicy,
}

impl S3Uploader {
    /// Creates an uploader.
    pub fn new(storage: Arc<dyn StorageManager>, pii_columns: Vec<String>, retry: RetryPolicy) -> Self {
        Self {
            storage,
            pii_columns,
            retry,
        }
    }

    /// The storage this uploader writes to.
    pub fn storage(&self) -> &Arc<dyn StorageManager> {
        &self.storage
    }

    /// The retry policy in force.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Masks the configured PII columns of `table`.
    pub fn mask_pii(&self, table: RecordBatch) -> Result<RecordBatch, TableError> {
        mask_columns(table, &self.pii_columns)
    }

    /// # Upload
    ///
    /// Masks `table` and writes it to `path` according to `mode`, then ships
    /// the run's log file. See the module documentation for the full sequence.
    ///
    /// # Errors
    /// Returns the last attempt's error once `max_attempts` attempts have
    /// failed, or immediately on a masking error or a write conflict.
    pub async fn upload(
        &self,
        table: RecordBatch,
        path: &str,
        mode: WriteMode,
        run: &RunContext,
    ) -> Result<UploadReport, UploadError> {
        let table = self.mask_pii(table)?;
        let mut uploaded: Option<DataUploaded> = None;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.attempt_upload(&table, path, mode, run, attempt, &mut uploaded).await {
                Ok((data, log_url)) => {
                    return Ok(UploadReport {
                        data_url: self.storage.object_url(path),
                        log_url,
                        rows_uploaded: table.num_rows(),
                        total_rows: data.total_rows,
                        columns: data.columns,
                        attempts: attempt,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    error!(attempt, url = %self.storage.object_url(path), error = %e, "Upload aborted");
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "Attempt {} failed: {}",
                        attempt,
                        e
                    );
                    if attempt >= self.retry.max_attempts {
                        return Err(e);
                    }
                    tokio::time::sleep(self.retry.backoff).await;
                }
            }
        }
    }

    async fn attempt_upload(
        &self,
        table: &RecordBatch,
        path: &str,
        mode: WriteMode,
        run: &RunContext,
        attempt: u32,
        uploaded: &mut Option<DataUploaded>,
    ) -> Result<(DataUploaded, Option<String>), UploadError> {
        let data = if let Some(data) = uploaded.as_ref() {
            info!(attempt, url = %self.storage.object_url(path), "Data already uploaded; retrying log upload only");
            data.clone()
        } else {
            let (target, condition) = self.build_target(table, path, mode).await?;

            std::fs::create_dir_all(run.scratch_dir())?;
            let scratch = tempfile::Builder::new()
                .prefix(&format!("{}_", run.task_name))
                .suffix(".parquet")
                .tempfile_in(run.scratch_dir())?;
            write_parquet_file(&target, scratch.path())?;

            self.storage.put_file(scratch.path(), path, condition).await?;
            info!(
                local = %scratch.path().display(),
                url = %self.storage.object_url(path),
                "Uploaded scratch file"
            );

            let record = GovernanceRecord::new(
                UPLOADER_NAME,
                run,
                self.storage.bucket(),
                path,
                mode,
                table.num_rows(),
                target.num_rows(),
                column_names(&target),
                attempt,
            );
            info!(
                governance = %record.to_json(),
                rows = record.rows,
                total_rows = record.total_rows,
                columns = ?record.columns,
                "Governance Info: Uploaded by {}",
                UPLOADER_NAME
            );

            let data = DataUploaded {
                total_rows: record.total_rows,
                columns: record.columns,
            };
            *uploaded = Some(data.clone());
            data
        };

        let log_url = self.upload_log(run).await?;
        Ok((data, log_url))
    }

    async fn build_target(
        &self,
        table: &RecordBatch,
        path: &str,
        mode: WriteMode,
    ) -> Result<(RecordBatch, WriteCondition), UploadError> {
        let url = self.storage.object_url(path);

        match mode {
            WriteMode::Overwrite => {
                info!(url = %url, rows = table.num_rows(), "Overwriting file");
                Ok((table.clone(), WriteCondition::Overwrite))
            }
            WriteMode::Append => match self.storage.read(path).await {
                Ok(existing) => {
                    let existing_table = decode_parquet(existing.bytes)?;
                    let merged = concat_tables(&existing_table, table)?;
                    info!(
                        url = %url,
                        existing_rows = existing_table.num_rows(),
                        new_rows = table.num_rows(),
                        "Appended data"
                    );
                    Ok((merged, WriteCondition::Matches(existing.version)))
                }
                Err(e) if e.is_not_found() => {
                    info!(url = %url, rows = table.num_rows(), "File not found. Creating new file");
                    Ok((table.clone(), WriteCondition::CreateOnly))
                }
                Err(e) => Err(e.into()),
            },
        }
    }

    async fn upload_log(&self, run: &RunContext) -> Result<Option<String>, UploadError> {
        let log_file = run.log_file();
        if !log_file.is_file() {
            warn!(log_file = %log_file.display(), "No local log file for this run; skipping log upload");
            return Ok(None);
        }

        let key = run.remote_log_key();
        self.storage
            .put_file(&log_file, &key, WriteCondition::Overwrite)
            .await?;

        let url = self.storage.object_url(&key);
        info!(url = %url, "Log file uploaded");
        Ok(Some(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_has_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::default().max_attempts, 3);
        assert_eq!(RetryPolicy::default().backoff, Duration::from_secs(2));
    }

    #[test]
    fn only_conflicts_are_final() {
        let conflict = UploadError::Storage(StorageError::Conflict { url: "s3://b/k".into() });
        let missing = UploadError::Storage(StorageError::NotFound { url: "s3://b/k".into() });
        let io = UploadError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));

        assert!(!conflict.is_retryable());
        assert!(missing.is_retryable());
        assert!(io.is_retryable());
    }
}
