//! # PII Masking
//!
//! Irreversible redaction of personally-identifiable columns. A masked value
//! keeps only its first and last character around a fixed marker, e.g.
//! `"alice@example.com"` becomes `"a***m"`. The masked form reveals at most two
//! original characters, but it still leaks the alphabet of the ends.
//!
//! Values whose string form is shorter than two characters are left as they
//! are, and null cells stay null.

use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use super::TableError;

/// Placed between the first and last character of every masked value.
pub const REDACTION_MARKER: &str = "***";

/// Masks a single value. Counts Unicode scalar values, not bytes.
pub fn mask_value(value: &str) -> String {
    let mut chars = value.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) => format!("{first}{REDACTION_MARKER}{last}"),
        _ => value.to_string(),
    }
}

/// # Mask Columns
///
/// Consumes `batch` and returns it with every column named in `pii_columns`
/// masked. Masked columns are converted to `Utf8` first, so numeric or
/// boolean PII columns are masked on their text form. Names in
/// `pii_columns` that the table does not have are ignored.
///
/// Applying this twice is a no-op on the values (`a***b` masks to `a***b`),
/// but the first pass has already changed the column type for good.
pub fn mask_columns(batch: RecordBatch, pii_columns: &[String]) -> Result<RecordBatch, TableError> {
    let schema = batch.schema();
    let is_pii = |name: &str| pii_columns.iter().any(|c| c == name);

    if !schema.fields().iter().any(|f| is_pii(f.name())) {
        return Ok(batch);
    }

    let mut fields: Vec<Field> = Vec::with_capacity(schema.fields().len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        if !is_pii(field.name()) {
            fields.push(field.as_ref().clone());
            columns.push(column.clone());
            continue;
        }

        let as_text = cast(column, &DataType::Utf8)?;
        let strings = as_text
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                ArrowError::CastError(format!("column '{}' did not cast to Utf8", field.name()))
            })?;
        let masked: StringArray = strings.iter().map(|v| v.map(mask_value)).collect();

        fields.push(Field::new(field.name(), DataType::Utf8, field.is_nullable()));
        columns.push(Arc::new(masked));
    }

    let masked_schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(masked_schema, columns, &options)?)
}
