//! # Uploaders Module
//!
//! Components that persist record tables to remote storage.
//!
//! - **`s3_uploader`**: masks PII columns, merges the batch into the existing
//!   remote Parquet table (or overwrites it), uploads the result through a
//!   uniquely named scratch file with a conditional put, ships the run's log
//!   file, and retries the whole sequence with a fixed backoff.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The masking, merging, retrying Parquet uploader.
pub mod s3_uploader;

pub use s3_uploader::{RetryPolicy, S3Uploader, UploadError, UploadReport};
