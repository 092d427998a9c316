//! # Core Pipeline Module
//!
//! This module holds the small set of types that every stage of the
//! `api_to_s3` pipeline shares, independent of where data comes from or
//! where it is written.
//!
//! ## Core Components:
//!
//! - **`run_context`**: The per-invocation identity of a pipeline run (task,
//!   environment, start timestamp, local directories). It is constructed once
//!   in `main` and handed to the logger and the uploader, so every derived
//!   path (local log file, remote log key) agrees on the same timestamp.
//!
//! - **`write_mode`**: The `WriteMode` enum selecting between appending to and
//!   overwriting a remote table.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Per-invocation run identity and derived log paths.
pub mod run_context;
/// Append / overwrite selection for remote tables.
pub mod write_mode;

// --- Public API Re-exports ---
pub use run_context::RunContext;
pub use write_mode::{ParseWriteModeError, WriteMode};
