//! # Loggers Module
//!
//! Structured logging for pipeline runs.
//!
//! - **`loggerlocal`**: builds the `tracing` subscriber for a run: a console
//!   layer and a JSON layer appending to the run's own log file, which the
//!   uploader ships to the object store once the data is written.
//! - **`logrecord`**: the serializable governance record emitted after every
//!   successful data upload.

/// Defines the governance record written to the log stream.
pub mod logrecord;
/// Builds and installs the per-run tracing subscriber.
pub mod loggerlocal;

pub use loggerlocal::{LoggerError, LoggerLocal, LoggerLocalOptions};
pub use logrecord::GovernanceRecord;
