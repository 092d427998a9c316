//! # Data Retrieval Module
//!
//! This module provides the generic HTTP client used by every ingestor in the
//! pipeline.
//!
//! ## Purpose:
//! The `retrieve` module keeps transport concerns (URL joining, headers,
//! bearer authentication, retry middleware, JSON decoding) in one place so
//! that ingestors only deal with the shape of the payload they expect.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: `ApiClient`, built on `reqwest` and `reqwest-middleware`,
//!   with a configurable number of transient-failure retries (zero makes the
//!   client single-shot).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Generic HTTP API client with retry middleware.
pub mod ky_http;
