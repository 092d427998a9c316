//! # Data Ingestors Module
//!
//! The "front door" of the pipeline: clients that pull a payload from an
//! external API and hand it on as a record table.
//!
//! ## Contained Modules:
//! - **`api_json`**: a single-shot REST client that projects one array field
//!   of a JSON response into a single-column table.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Single-shot JSON field fetcher.
pub mod api_json;

// --- Public API Re-exports ---
pub use api_json::{normalize_base_url, ApiSource, FetchError, JsonFieldIngestor};
