//! # Utilities Module
//!
//! General-purpose helpers shared across `lib_common` that do not belong to a
//! specific pipeline stage.
//!
//! ## Contained Modules:
//!
//! - **`misc`**: time formatting (`utils`) and host identity (`sys_info`).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Miscellaneous utility functions, including host information and time helpers.
pub mod misc;
