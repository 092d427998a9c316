use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use arrow::compute::concat_batches;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use super::TableError;

fn writer_properties() -> WriterProperties {
    let created_by = KeyValue {
        key: "created_by".to_string(),
        value: Some("api_to_s3".to_string()),
    };
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![created_by]))
        .build()
}

/// Writes `batch` as a single-row-group Parquet file at `path`, replacing any
/// file already there.
pub fn write_parquet_file(batch: &RecordBatch, path: &Path) -> Result<(), TableError> {
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties()))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Encodes `batch` as Parquet into memory.
pub fn encode_parquet(batch: &RecordBatch) -> Result<Bytes, TableError> {
    let mut cursor = Cursor::new(Vec::<u8>::new());
    let mut writer = ArrowWriter::try_new(&mut cursor, batch.schema(), Some(writer_properties()))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(Bytes::from(cursor.into_inner()))
}

/// Decodes a whole Parquet object into one table.
///
/// Every row group is read and the resulting batches are concatenated, so the
/// caller always gets exactly one `RecordBatch` (possibly with zero rows).
pub fn decode_parquet(bytes: Bytes) -> Result<RecordBatch, TableError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let batches = reader.collect::<Result<Vec<RecordBatch>, ArrowError>>()?;
    Ok(concat_batches(&schema, &batches)?)
}
