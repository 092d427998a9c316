//! # Object Storage Module
//!
//! Remote persistence for the pipeline. The uploader only talks to the
//! [`StorageManager`] trait, which keeps the surface to the two operations the
//! pipeline needs:
//!
//! - **read** an object by key, returning its bytes together with the version
//!   token the store assigned to it (or `StorageError::NotFound`);
//! - **put** a local file at a key, optionally guarded by a [`WriteCondition`]
//!   so that a concurrent writer is detected instead of silently overwritten.
//!
//! [`ObjectStorage`] implements the trait over any `object_store::ObjectStore`:
//! Amazon S3 (and S3-compatible endpoints such as MinIO) in production and
//! `object_store::memory::InMemory` in tests.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// The `object_store`-backed implementation.
pub mod object_storage;

pub use object_storage::{ObjectStorage, S3Settings};

/// Version token of a stored object, as reported by the store on read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectVersion {
    /// Entity tag, if the store exposes one.
    pub e_tag: Option<String>,
    /// Object version id, if the bucket is versioned.
    pub version: Option<String>,
}

/// An object read from the store.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    /// Full object content.
    pub bytes: Bytes,
    /// Version the content was read at.
    pub version: ObjectVersion,
}

/// Precondition attached to a put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    /// Replace unconditionally.
    Overwrite,
    /// Succeed only if nothing exists at the key yet.
    CreateOnly,
    /// Succeed only if the stored object is still at this version.
    Matches(ObjectVersion),
}

/// Errors raised by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No object at the requested key.
    #[error("Object not found: {url}")]
    NotFound {
        /// Location that was read.
        url: String,
    },

    /// The put precondition failed: another writer changed the object.
    #[error("Object {url} was modified by another writer since it was read")]
    Conflict {
        /// Location that was written.
        url: String,
    },

    /// Any other failure reported by the object store.
    #[error("Object store error for {url}: {source}")]
    Remote {
        /// Location involved.
        url: String,
        /// Underlying store error.
        #[source]
        source: object_store::Error,
    },

    /// The local file to upload could not be read.
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    /// The store client could not be built.
    #[error("Storage configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Classifies an `object_store` error for the object at `url`.
    pub fn from_store(url: String, source: object_store::Error) -> Self {
        match source {
            object_store::Error::NotFound { .. } => StorageError::NotFound { url },
            object_store::Error::Precondition { .. } | object_store::Error::AlreadyExists { .. } => {
                StorageError::Conflict { url }
            }
            source => StorageError::Remote { url, source },
        }
    }

    /// `true` for the not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// # Storage Manager
///
/// The remote side of the pipeline: one bucket, keyed objects.
#[async_trait]
pub trait StorageManager: Debug + Send + Sync {
    /// URL scheme used in log messages (`s3`, `memory`, ...).
    fn scheme(&self) -> &str;

    /// Bucket every key is resolved against.
    fn bucket(&self) -> &str;

    /// Human-readable location of `key`, e.g. `s3://bucket/demo/api_data.parquet`.
    fn object_url(&self, key: &str) -> String {
        format!("{}://{}/{}", self.scheme(), self.bucket(), key)
    }

    /// Reads the whole object at `key`.
    async fn read(&self, key: &str) -> Result<RemoteObject, StorageError>;

    /// Uploads the file at `local_path` to `key` under `condition`.
    async fn put_file(
        &self,
        local_path: &Path,
        key: &str,
        condition: WriteCondition,
    ) -> Result<(), StorageError>;
}
