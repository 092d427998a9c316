//! # lib_common
//!
//! Building blocks of the `api_to_s3` ingestion pipeline, one module per
//! folder, each behind a feature of the same name:
//!
//! - `configs`: layered JSON configuration, encrypted cloud overlay, typed settings.
//! - `core`: run context and write modes.
//! - `ingestors`: API payloads to record tables.
//! - `loggers`: console and per-run file logging, governance records.
//! - `retrieve`: HTTP client with retry middleware.
//! - `storage`: object-store access with conditional writes.
//! - `tables`: Arrow tables, Parquet encoding, PII masking.
//! - `uploaders`: the masking, merging, retrying uploader.
//! - `utils`: time and host helpers.

#[cfg(feature = "configs")]
pub mod configs;

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "ingestors")]
pub mod ingestors;

#[cfg(feature = "loggers")]
pub mod loggers;

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "storage")]
pub mod storage;

#[cfg(feature = "tables")]
pub mod tables;

#[cfg(feature = "uploaders")]
pub mod uploaders;

#[cfg(feature = "utils")]
pub mod utils;
