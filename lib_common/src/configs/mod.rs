//! # Configuration Modules
//!
//! This module aggregates the configuration providers of the pipeline:
//! layered JSON files on disk, an optional encrypted overlay fetched from the
//! cloud, and the typed pipeline settings parsed from both.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use thiserror::Error;

/// Provides functionality for retrieving and decrypting cloud-based configurations.
pub mod config_cloud;

/// Typed pipeline settings built from the flattened option map.
pub mod config_pipeline;

/// Provides system-level configuration management.
pub mod config_sys;

pub use config_cloud::{decrypt_cloud_payload, flatten_json, load_cloud_config, CloudConfigError};
pub use config_pipeline::{apply_env_overrides, PipelineConfig};
pub use config_sys::{get_runtime_config, load_runtime_config, RuntimeConfig};

/// Errors raised while assembling the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Locating the executable or reading a config file failed.
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration files could not be parsed.
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// A required key has no value.
    #[error("Missing required configuration value: {0}")]
    MissingValue(String),

    /// A key holds a value of the wrong form.
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The encrypted cloud overlay could not be loaded.
    #[error(transparent)]
    Cloud(#[from] CloudConfigError),
}
