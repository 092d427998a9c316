use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::aws::{AmazonS3Builder, S3ConditionalPut};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload, UpdateVersion};
use tracing::{debug, warn};

use super::{ObjectVersion, RemoteObject, StorageError, StorageManager, WriteCondition};

/// Connection settings for an S3 (or S3-compatible) bucket.
///
/// Unset optional fields fall back to the standard `AWS_*` environment
/// variables picked up by `AmazonS3Builder::from_env`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Settings {
    /// Target bucket.
    pub bucket_name: String,
    /// AWS region.
    pub region: Option<String>,
    /// Custom endpoint for MinIO and other S3-compatible stores.
    pub endpoint: Option<String>,
    /// Static access key id.
    pub access_key_id: Option<String>,
    /// Static secret access key.
    pub secret_access_key: Option<String>,
    /// Permit plain-HTTP endpoints.
    pub allow_http: bool,
    /// Guard puts with ETag / if-none-match preconditions.
    pub conditional_writes: bool,
}

/// # Object Storage
///
/// A [`StorageManager`] over any `object_store::ObjectStore`, bound to one
/// bucket for its whole lifetime.
#[derive(Debug)]
pub struct ObjectStorage {
    scheme: String,
    bucket: String,
    store: Arc<dyn ObjectStore>,
    conditional_writes: bool,
}

impl ObjectStorage {
    /// Builds an S3 client for `settings.bucket_name`.
    ///
    /// # Errors
    /// Returns `StorageError::Config` when the bucket name is empty or the
    /// builder rejects the settings.
    pub fn s3(settings: &S3Settings) -> Result<Self, StorageError> {
        if settings.bucket_name.trim().is_empty() {
            return Err(StorageError::Config("bucket name is empty".to_string()));
        }

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&settings.bucket_name)
            .with_allow_http(settings.allow_http)
            .with_conditional_put(S3ConditionalPut::ETagMatch);

        if let Some(region) = &settings.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &settings.endpoint {
            // S3-compatible stores want path-style URLs
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false);
        }
        if let (Some(key), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
            builder = builder
                .with_access_key_id(key)
                .with_secret_access_key(secret);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self::with_store(
            "s3",
            &settings.bucket_name,
            Arc::new(store),
            settings.conditional_writes,
        ))
    }

    /// An in-process store, used by tests and dry runs.
    pub fn in_memory(bucket: &str) -> Self {
        Self::with_store("memory", bucket, Arc::new(InMemory::new()), true)
    }

    /// Wraps an existing store.
    pub fn with_store(
        scheme: &str,
        bucket: &str,
        store: Arc<dyn ObjectStore>,
        conditional_writes: bool,
    ) -> Self {
        Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            store,
            conditional_writes,
        }
    }

    /// The underlying store handle.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    fn put_mode(&self, key: &str, condition: WriteCondition) -> PutMode {
        if !self.conditional_writes {
            return PutMode::Overwrite;
        }
        match condition {
            WriteCondition::Overwrite => PutMode::Overwrite,
            WriteCondition::CreateOnly => PutMode::Create,
            WriteCondition::Matches(ObjectVersion { e_tag: None, version: None }) => {
                warn!(
                    url = %self.object_url(key),
                    "Stored object has no version token; writing without precondition"
                );
                PutMode::Overwrite
            }
            WriteCondition::Matches(ObjectVersion { e_tag, version }) => {
                PutMode::Update(UpdateVersion { e_tag, version })
            }
        }
    }
}

#[async_trait]
impl StorageManager for ObjectStorage {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn read(&self, key: &str) -> Result<RemoteObject, StorageError> {
        let location = ObjectPath::from(key);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| StorageError::from_store(self.object_url(key), e))?;

        let version = ObjectVersion {
            e_tag: result.meta.e_tag.clone(),
            version: result.meta.version.clone(),
        };
        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::from_store(self.object_url(key), e))?;

        debug!(url = %self.object_url(key), bytes = bytes.len(), "Read object");
        Ok(RemoteObject { bytes, version })
    }

    async fn put_file(
        &self,
        local_path: &Path,
        key: &str,
        condition: WriteCondition,
    ) -> Result<(), StorageError> {
        let data = std::fs::read(local_path)?;
        let size = data.len();
        let location = ObjectPath::from(key);
        let mode = self.put_mode(key, condition);

        self.store
            .put_opts(&location, PutPayload::from(data), PutOptions::from(mode))
            .await
            .map_err(|e| StorageError::from_store(self.object_url(key), e))?;

        debug!(url = %self.object_url(key), bytes = size, "Put object");
        Ok(())
    }
}
