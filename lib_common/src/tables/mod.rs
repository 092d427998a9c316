//! # Record Tables Module
//!
//! In-memory tables for the pipeline are Arrow `RecordBatch`es. This module
//! collects everything the pipeline does *to* a table between fetching and
//! uploading it:
//!
//! - **`record_table`**: building a single-column table from JSON scalars and
//!   concatenating two tables whose schemas may have drifted.
//! - **`parquet_io`**: encoding a table to a Parquet file on local disk and
//!   decoding a Parquet object downloaded from the store.
//! - **`pii_mask`**: irreversible masking of personally-identifiable columns.
//!
//! All operations return [`TableError`] on failure.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

/// Parquet encoding and decoding.
pub mod parquet_io;
/// Masking of PII columns.
pub mod pii_mask;
/// Table construction and concatenation.
pub mod record_table;

pub use parquet_io::{decode_parquet, encode_parquet, write_parquet_file};
pub use pii_mask::{mask_columns, mask_value, REDACTION_MARKER};
pub use record_table::{column_names, concat_tables, from_json_values};

/// Errors raised while building, transforming or serializing a table.
#[derive(Debug, Error)]
pub enum TableError {
    /// An Arrow compute or construction error.
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// A Parquet encode/decode error.
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Local file I/O failed while writing a scratch file.
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON value cannot be placed in a scalar column.
    #[error("Column '{column}' row {index}: unsupported {kind} value")]
    UnsupportedValue {
        /// Target column name.
        column: String,
        /// Position of the offending value.
        index: usize,
        /// JSON kind of the value (`object` or `array`).
        kind: &'static str,
    },
}
