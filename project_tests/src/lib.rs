//! # Project Test Fixtures
//!
//! Shared helpers for the workspace integration tests in `tests/`:
//! table builders, run contexts rooted in a temp directory, and
//! [`FlakyStorage`], a [`StorageManager`] double that injects failures and
//! concurrent writes in front of a real in-memory store.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use arrow::array::{Array, StringArray};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::PutPayload;
use object_store::path::Path as ObjectPath;

use lib_common::core::RunContext;
use lib_common::storage::{ObjectStorage, RemoteObject, StorageError, StorageManager, WriteCondition};
use lib_common::tables::{decode_parquet, from_json_values};

/// Bucket name used by every test store.
pub const TEST_BUCKET: &str = "test-bucket";

/// A one-column `image_url` table.
pub fn image_table(urls: &[&str]) -> RecordBatch {
    let values: Vec<serde_json::Value> = urls.iter().map(|u| serde_json::Value::from(*u)).collect();
    from_json_values("image_url", &values).expect("string values always build a table")
}

/// A run context whose log and scratch directories live under `root`.
pub fn run_context(root: &Path, task: &str) -> RunContext {
    RunContext::new(task, "test", root.join("logs"), root.join("scratch"))
}

/// Reads and decodes the Parquet object at `key`.
pub async fn read_table(storage: &dyn StorageManager, key: &str) -> RecordBatch {
    let object = storage.read(key).await.expect("object should exist");
    decode_parquet(object.bytes).expect("object should be valid parquet")
}

/// The values of a string column, nulls as `None`.
pub fn string_column(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
    let column = batch
        .column_by_name(name)
        .unwrap_or_else(|| panic!("column {name} missing"));
    let strings = column
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap_or_else(|| panic!("column {name} is not Utf8"));
    (0..strings.len())
        .map(|i| (!strings.is_null(i)).then(|| strings.value(i).to_string()))
        .collect()
}

/// # Flaky Storage
///
/// Delegates to an in-memory [`ObjectStorage`] after optionally failing a
/// number of reads, failing a number of puts under a key prefix, or writing
/// a competing object right after a read.
#[derive(Debug)]
pub struct FlakyStorage {
    inner: ObjectStorage,
    read_failures: AtomicU32,
    put_failures: AtomicU32,
    put_failure_prefix: String,
    interleaved_write: Option<Bytes>,
    reads: AtomicU32,
    puts: AtomicU32,
}

impl FlakyStorage {
    /// Wraps a fresh in-memory store for [`TEST_BUCKET`].
    pub fn new() -> Self {
        Self {
            inner: ObjectStorage::in_memory(TEST_BUCKET),
            read_failures: AtomicU32::new(0),
            put_failures: AtomicU32::new(0),
            put_failure_prefix: String::new(),
            interleaved_write: None,
            reads: AtomicU32::new(0),
            puts: AtomicU32::new(0),
        }
    }

    /// Fails the next `count` reads. `u32::MAX` fails all of them.
    pub fn failing_reads(self, count: u32) -> Self {
        self.read_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Fails the next `count` puts whose key starts with `prefix`.
    pub fn failing_puts(mut self, prefix: &str, count: u32) -> Self {
        self.put_failure_prefix = prefix.to_string();
        self.put_failures.store(count, Ordering::SeqCst);
        self
    }

    /// After every successful read, overwrites the object with `content`.
    pub fn with_interleaved_write(mut self, content: Bytes) -> Self {
        self.interleaved_write = Some(content);
        self
    }

    /// Reads attempted so far.
    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Puts attempted so far.
    pub fn puts(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    /// The wrapped store, for seeding and inspecting objects.
    pub fn inner(&self) -> &ObjectStorage {
        &self.inner
    }

    fn injected(&self, key: &str) -> StorageError {
        StorageError::Remote {
            url: self.object_url(key),
            source: object_store::Error::Generic {
                store: "flaky",
                source: "injected failure".into(),
            },
        }
    }
}

impl Default for FlakyStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumes one unit of a failure budget, if any is left.
fn take_failure(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl StorageManager for FlakyStorage {
    fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    async fn read(&self, key: &str) -> Result<RemoteObject, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.read_failures) {
            return Err(self.injected(key));
        }

        let object = self.inner.read(key).await?;
        if let Some(content) = &self.interleaved_write {
            self.inner
                .store()
                .put(&ObjectPath::from(key), PutPayload::from(content.clone()))
                .await
                .map_err(|e| StorageError::from_store(self.object_url(key), e))?;
        }
        Ok(object)
    }

    async fn put_file(
        &self,
        local_path: &Path,
        key: &str,
        condition: WriteCondition,
    ) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if key.starts_with(&self.put_failure_prefix) && take_failure(&self.put_failures) {
            return Err(self.injected(key));
        }
        self.inner.put_file(local_path, key, condition).await
    }
}
