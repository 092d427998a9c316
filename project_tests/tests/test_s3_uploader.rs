//! # S3 Uploader Integration Tests
//!
//! Runs the uploader against an in-memory object store, with failures and
//! concurrent writes injected through `FlakyStorage`.

use std::sync::Arc;
use std::time::Duration;

use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::{Local, TimeZone};
use tempfile::tempdir;

use lib_common::core::{RunContext, WriteMode};
use lib_common::loggers::{LoggerLocal, LoggerLocalOptions};
use lib_common::storage::{StorageError, StorageManager};
use lib_common::tables::encode_parquet;
use lib_common::uploaders::{RetryPolicy, S3Uploader, UploadError};
use project_tests::{image_table, read_table, run_context, string_column, FlakyStorage};

const TARGET: &str = "demo/api_data.parquet";

fn uploader(storage: Arc<FlakyStorage>, pii: &[&str], retry: RetryPolicy) -> S3Uploader {
    S3Uploader::new(storage, pii.iter().map(|c| c.to_string()).collect(), retry)
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

#[tokio::test]
async fn append_to_missing_object_creates_it() {
    let dir = tempdir().unwrap();
    let run = run_context(dir.path(), "create");
    let storage = Arc::new(FlakyStorage::new());

    let report = uploader(storage.clone(), &[], quick_retry())
        .upload(image_table(&["a.jpg", "b.jpg", "c.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap();

    assert_eq!(report.rows_uploaded, 3);
    assert_eq!(report.total_rows, 3);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.columns, vec!["image_url".to_string()]);
    assert_eq!(report.data_url, "memory://test-bucket/demo/api_data.parquet");

    let remote = read_table(storage.as_ref(), TARGET).await;
    assert_eq!(
        string_column(&remote, "image_url"),
        vec![Some("a.jpg".into()), Some("b.jpg".into()), Some("c.jpg".into())]
    );
}

#[tokio::test]
async fn append_keeps_existing_rows_first_without_dedup() {
    let dir = tempdir().unwrap();
    let run = run_context(dir.path(), "append");
    let storage = Arc::new(FlakyStorage::new());
    let uploader = uploader(storage.clone(), &[], quick_retry());

    uploader
        .upload(image_table(&["a.jpg", "b.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap();
    let report = uploader
        .upload(image_table(&["b.jpg", "c.jpg", "d.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap();

    assert_eq!(report.rows_uploaded, 3);
    assert_eq!(report.total_rows, 5);

    let remote = read_table(storage.as_ref(), TARGET).await;
    let urls: Vec<String> = string_column(&remote, "image_url").into_iter().flatten().collect();
    assert_eq!(urls, vec!["a.jpg", "b.jpg", "b.jpg", "c.jpg", "d.jpg"]);
}

#[tokio::test]
async fn overwrite_replaces_existing_object() {
    let dir = tempdir().unwrap();
    let run = run_context(dir.path(), "overwrite");
    let storage = Arc::new(FlakyStorage::new());
    let uploader = uploader(storage.clone(), &[], quick_retry());

    uploader
        .upload(image_table(&["a.jpg", "b.jpg", "c.jpg", "d.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap();
    let reads_before = storage.reads();
    let report = uploader
        .upload(image_table(&["z.jpg"]), TARGET, WriteMode::Overwrite, &run)
        .await
        .unwrap();

    // Overwrite never reads the existing object.
    assert_eq!(storage.reads(), reads_before);
    assert_eq!(report.total_rows, 1);
    let remote = read_table(storage.as_ref(), TARGET).await;
    assert_eq!(string_column(&remote, "image_url"), vec![Some("z.jpg".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn log_retry_reports_merged_totals() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(FlakyStorage::new().failing_puts("logs/", 1));

    let seed_run = run_context(dir.path(), "seed");
    uploader(storage.clone(), &[], quick_retry())
        .upload(image_table(&["a.jpg", "b.jpg"]), TARGET, WriteMode::Append, &seed_run)
        .await
        .unwrap();

    let run = run_context(dir.path(), "merged");
    std::fs::create_dir_all(&run.log_dir).unwrap();
    std::fs::write(run.log_file(), "{\"message\":\"run log\"}\n").unwrap();

    let report = uploader(storage.clone(), &[], quick_retry())
        .upload(image_table(&["c.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.rows_uploaded, 1);
    assert_eq!(report.total_rows, 3);
    assert_eq!(report.columns, vec!["image_url".to_string()]);
}

#[tokio::test]
async fn pii_columns_are_masked_before_upload() {
    let dir = tempdir().unwrap();
    let run = run_context(dir.path(), "mask");
    let storage = Arc::new(FlakyStorage::new());

    let schema = Arc::new(Schema::new(vec![
        Field::new("image_url", DataType::Utf8, true),
        Field::new("email", DataType::Utf8, true),
        Field::new("phone", DataType::Int64, true),
    ]));
    let table = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec![Some("a.jpg"), Some("b.jpg"), Some("c.jpg")])),
            Arc::new(StringArray::from(vec![Some("alice@example.com"), Some("b"), None])),
            Arc::new(Int64Array::from(vec![Some(5551234), Some(7), None])),
        ],
    )
    .unwrap();

    uploader(storage.clone(), &["email", "phone", "ssn"], quick_retry())
        .upload(table, TARGET, WriteMode::Overwrite, &run)
        .await
        .unwrap();

    let remote = read_table(storage.as_ref(), TARGET).await;
    assert_eq!(
        string_column(&remote, "email"),
        vec![Some("a***m".to_string()), Some("b".to_string()), None]
    );
    assert_eq!(
        string_column(&remote, "phone"),
        vec![Some("5***4".to_string()), Some("7".to_string()), None]
    );
    assert_eq!(
        string_column(&remote, "image_url"),
        vec![Some("a.jpg".into()), Some("b.jpg".into()), Some("c.jpg".into())]
    );
}

#[tokio::test(start_paused = true)]
async fn retries_exactly_max_attempts_with_fixed_backoff() {
    let dir = tempdir().unwrap();
    let run = run_context(dir.path(), "exhaust");
    let storage = Arc::new(FlakyStorage::new().failing_reads(u32::MAX));
    let retry = RetryPolicy::new(3, Duration::from_secs(2));

    let started = tokio::time::Instant::now();
    let err = uploader(storage.clone(), &[], retry)
        .upload(image_table(&["a.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, UploadError::Storage(StorageError::Remote { .. })));
    assert_eq!(storage.reads(), 3);
    assert_eq!(storage.puts(), 0);
    // Two delays between three attempts.
    assert!(elapsed >= Duration::from_secs(4), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn transient_failure_recovers_on_next_attempt() {
    let dir = tempdir().unwrap();
    let run = run_context(dir.path(), "recover");
    let storage = Arc::new(FlakyStorage::new().failing_reads(1));

    let report = uploader(storage.clone(), &[], RetryPolicy::new(3, Duration::from_secs(2)))
        .upload(image_table(&["a.jpg", "b.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(read_table(storage.as_ref(), TARGET).await.num_rows(), 2);
}

#[tokio::test]
async fn concurrent_writer_conflict_fails_fast() {
    let dir = tempdir().unwrap();
    let run = run_context(dir.path(), "conflict");
    // Every successful read is followed by a competing write.
    let storage = Arc::new(
        FlakyStorage::new().with_interleaved_write(Bytes::from_static(b"someone else")),
    );
    let uploader = uploader(storage.clone(), &[], quick_retry());

    // Nothing to read yet, so nothing races the first write.
    uploader
        .upload(image_table(&["a.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap();

    let err = uploader
        .upload(image_table(&["b.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Storage(StorageError::Conflict { .. })));
    assert!(!err.is_retryable());
    assert_eq!(storage.reads(), 2);
    assert_eq!(storage.puts(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_log_upload_does_not_append_twice() {
    let dir = tempdir().unwrap();
    let run = run_context(dir.path(), "logfail");
    std::fs::create_dir_all(&run.log_dir).unwrap();
    std::fs::write(run.log_file(), "{\"message\":\"run log\"}\n").unwrap();

    let storage = Arc::new(FlakyStorage::new().failing_puts("logs/", 1));
    let report = uploader(storage.clone(), &[], RetryPolicy::new(3, Duration::from_secs(2)))
        .upload(image_table(&["a.jpg", "b.jpg", "c.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.total_rows, 3);
    assert_eq!(storage.reads(), 1);
    assert_eq!(read_table(storage.as_ref(), TARGET).await.num_rows(), 3);

    let shipped = storage.read(&run.remote_log_key()).await.unwrap();
    assert_eq!(shipped.bytes.as_ref(), b"{\"message\":\"run log\"}\n");
    assert_eq!(
        report.log_url.as_deref(),
        Some(storage.object_url(&run.remote_log_key()).as_str())
    );
}

#[tokio::test]
async fn log_file_lands_at_derived_key() {
    let dir = tempdir().unwrap();
    let started = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 42).unwrap();
    let run = RunContext::with_start(
        "api_ingest",
        "staging",
        dir.path().join("logs"),
        dir.path().join("scratch"),
        started,
    );
    std::fs::create_dir_all(&run.log_dir).unwrap();
    std::fs::write(run.log_file(), "line\n").unwrap();

    let storage = Arc::new(FlakyStorage::new());
    let report = uploader(storage.clone(), &[], quick_retry())
        .upload(image_table(&["a.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap();

    let key = "logs/staging/api_ingest/2024-03-09/api_ingest_070542.log";
    assert_eq!(report.log_url, Some(format!("memory://test-bucket/{key}")));
    assert!(storage.read(key).await.is_ok());
}

#[tokio::test]
async fn missing_log_file_is_skipped() {
    let dir = tempdir().unwrap();
    let run = run_context(dir.path(), "nolog");
    let storage = Arc::new(FlakyStorage::new());

    let report = uploader(storage.clone(), &[], quick_retry())
        .upload(image_table(&["a.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap();

    assert!(report.log_url.is_none());
    assert_eq!(storage.puts(), 1);
}

#[tokio::test]
async fn scratch_files_are_removed_after_upload() {
    let dir = tempdir().unwrap();
    let run = run_context(dir.path(), "scratch");
    let storage = Arc::new(FlakyStorage::new());

    uploader(storage, &[], quick_retry())
        .upload(image_table(&["a.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(run.scratch_dir()).unwrap().collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn shipped_log_contains_governance_record() {
    let dir = tempdir().unwrap();
    let run = run_context(dir.path(), "governed");
    let options = LoggerLocalOptions {
        use_tty: false,
        use_file: true,
        level: "info".to_string(),
    };
    let logger = LoggerLocal::new(&run, Some(options)).unwrap();
    let _guard = tracing::subscriber::set_default(logger.subscriber().unwrap());

    let storage = Arc::new(FlakyStorage::new());
    uploader(storage.clone(), &[], quick_retry())
        .upload(image_table(&["a.jpg", "b.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap();

    let shipped = storage.read(&run.remote_log_key()).await.unwrap();
    let text = String::from_utf8(shipped.bytes.to_vec()).unwrap();
    assert!(text.contains("Governance Info: Uploaded by S3Uploader"));
    assert!(text.contains("File not found. Creating new file"));

    let governance_line = text
        .lines()
        .find(|line| line.contains("Governance Info"))
        .unwrap();
    let event: serde_json::Value = serde_json::from_str(governance_line).unwrap();
    assert_eq!(event["fields"]["rows"], 2);
    assert_eq!(event["fields"]["total_rows"], 2);
}

#[tokio::test]
async fn append_unions_a_drifted_existing_schema() {
    let dir = tempdir().unwrap();
    let run = run_context(dir.path(), "drift");
    let storage = Arc::new(FlakyStorage::new());

    // An older writer stored a `breed` column next to the urls.
    let schema = Arc::new(Schema::new(vec![
        Field::new("image_url", DataType::Utf8, true),
        Field::new("breed", DataType::Utf8, true),
    ]));
    let older = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec!["old.jpg"])),
            Arc::new(StringArray::from(vec!["akita"])),
        ],
    )
    .unwrap();
    storage
        .inner()
        .store()
        .put(
            &object_store::path::Path::from(TARGET),
            encode_parquet(&older).unwrap().into(),
        )
        .await
        .unwrap();

    let report = uploader(storage.clone(), &[], quick_retry())
        .upload(image_table(&["new.jpg"]), TARGET, WriteMode::Append, &run)
        .await
        .unwrap();

    assert_eq!(report.columns, vec!["image_url".to_string(), "breed".to_string()]);
    let remote = read_table(storage.as_ref(), TARGET).await;
    assert_eq!(
        string_column(&remote, "image_url"),
        vec![Some("old.jpg".into()), Some("new.jpg".into())]
    );
    assert_eq!(string_column(&remote, "breed"), vec![Some("akita".into()), None]);
}
