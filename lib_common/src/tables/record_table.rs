use std::sync::Arc;

use arrow::array::{
    new_null_array, ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use serde_json::Value;

use super::TableError;

/// Column type inferred from a run of JSON scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarKind {
    Boolean,
    Int64,
    Float64,
    Utf8,
}

impl ScalarKind {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ScalarKind::Boolean),
            Value::Number(n) if n.is_i64() => Some(ScalarKind::Int64),
            Value::Number(_) => Some(ScalarKind::Float64),
            Value::String(_) => Some(ScalarKind::Utf8),
            // rejected before inference
            Value::Array(_) | Value::Object(_) => Some(ScalarKind::Utf8),
        }
    }

    fn widen(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (ScalarKind::Int64, ScalarKind::Float64) | (ScalarKind::Float64, ScalarKind::Int64) => {
                ScalarKind::Float64
            }
            _ => ScalarKind::Utf8,
        }
    }

    fn data_type(self) -> DataType {
        match self {
            ScalarKind::Boolean => DataType::Boolean,
            ScalarKind::Int64 => DataType::Int64,
            ScalarKind::Float64 => DataType::Float64,
            ScalarKind::Utf8 => DataType::Utf8,
        }
    }
}

/// # From JSON Values
///
/// Builds a single-column table named `column` from a sequence of JSON scalars.
///
/// The column type is the narrowest one that holds every non-null value:
/// booleans, integers, floats (integers mixed with floats widen to float), or
/// strings. Any other mix falls back to a string column in which non-string
/// scalars keep their JSON text. `null` becomes a null cell, and an empty or
/// all-null input yields a string column.
///
/// # Errors
/// Returns `TableError::UnsupportedValue` if an element is an object or array.
pub fn from_json_values(column: &str, values: &[Value]) -> Result<RecordBatch, TableError> {
    for (index, value) in values.iter().enumerate() {
        let kind = match value {
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            _ => continue,
        };
        return Err(TableError::UnsupportedValue {
            column: column.to_string(),
            index,
            kind,
        });
    }

    let kind = values
        .iter()
        .filter_map(ScalarKind::of)
        .reduce(ScalarKind::widen)
        .unwrap_or(ScalarKind::Utf8);

    let array: ArrayRef = match kind {
        ScalarKind::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(values.len());
            for value in values {
                builder.append_option(value.as_bool());
            }
            Arc::new(builder.finish())
        }
        ScalarKind::Int64 => {
            let mut builder = Int64Builder::with_capacity(values.len());
            for value in values {
                builder.append_option(value.as_i64());
            }
            Arc::new(builder.finish())
        }
        ScalarKind::Float64 => {
            let mut builder = Float64Builder::with_capacity(values.len());
            for value in values {
                builder.append_option(value.as_f64());
            }
            Arc::new(builder.finish())
        }
        ScalarKind::Utf8 => {
            let mut builder = StringBuilder::with_capacity(values.len(), values.len() * 16);
            for value in values {
                match value {
                    Value::Null => builder.append_null(),
                    Value::String(s) => builder.append_value(s),
                    other => builder.append_value(other.to_string()),
                }
            }
            Arc::new(builder.finish())
        }
    };

    let schema = Arc::new(Schema::new(vec![Field::new(column, kind.data_type(), true)]));
    Ok(RecordBatch::try_new(schema, vec![array])?)
}

/// # Concatenate Tables
///
/// Returns the rows of `existing` followed by the rows of `new`. No rows are
/// deduplicated or reordered.
///
/// The schemas are unioned by column name: `existing`'s columns come first in
/// their original order, then any columns only `new` has. A column absent on
/// one side is null-filled for those rows; a column whose type differs between
/// the sides is cast to `Utf8` on both.
pub fn concat_tables(existing: &RecordBatch, new: &RecordBatch) -> Result<RecordBatch, TableError> {
    let schema = unified_schema(existing.schema_ref(), new.schema_ref());
    let aligned = [align_to(existing, &schema)?, align_to(new, &schema)?];
    Ok(concat_batches(&schema, &aligned)?)
}

/// Column names of `batch` in schema order.
pub fn column_names(batch: &RecordBatch) -> Vec<String> {
    batch
        .schema_ref()
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect()
}

fn unified_schema(left: &Schema, right: &Schema) -> SchemaRef {
    let mut fields: Vec<Field> = Vec::with_capacity(left.fields().len() + right.fields().len());

    for field in left.fields() {
        let unified = match right.field_with_name(field.name()) {
            Ok(other) if other.data_type() == field.data_type() => Field::new(
                field.name(),
                field.data_type().clone(),
                field.is_nullable() || other.is_nullable(),
            ),
            Ok(_) => Field::new(field.name(), DataType::Utf8, true),
            Err(_) => Field::new(field.name(), field.data_type().clone(), true),
        };
        fields.push(unified);
    }

    for field in right.fields() {
        if left.field_with_name(field.name()).is_err() {
            fields.push(Field::new(field.name(), field.data_type().clone(), true));
        }
    }

    Arc::new(Schema::new(fields))
}

fn align_to(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch, TableError> {
    let columns = schema
        .fields()
        .iter()
        .map(|field| match batch.column_by_name(field.name()) {
            Some(column) if column.data_type() == field.data_type() => Ok(column.clone()),
            Some(column) => Ok(cast(column, field.data_type())?),
            None => Ok(new_null_array(field.data_type(), batch.num_rows())),
        })
        .collect::<Result<Vec<ArrayRef>, TableError>>()?;

    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(schema.clone(), columns, &options)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, Int64Array, StringArray};
    use serde_json::json;

    fn strings(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
            .iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    #[test]
    fn builds_string_column_from_urls() {
        let values = vec![
            json!("https://images.dog.ceo/breeds/hound/n1.jpg"),
            json!("https://images.dog.ceo/breeds/pug/n2.jpg"),
        ];
        let batch = from_json_values("image_url", &values).unwrap();

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(column_names(&batch), vec!["image_url".to_string()]);
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Utf8);
        assert_eq!(
            strings(&batch, "image_url")[1].as_deref(),
            Some("https://images.dog.ceo/breeds/pug/n2.jpg")
        );
    }

    #[test]
    fn infers_numeric_columns_and_keeps_nulls() {
        let ints = from_json_values("n", &[json!(1), json!(null), json!(3)]).unwrap();
        let col = ints.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(col.value(2), 3);
        assert!(col.is_null(1));

        let floats = from_json_values("n", &[json!(1), json!(2.5)]).unwrap();
        let col = floats.column(0).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(col.value(0), 1.0);
    }

    #[test]
    fn mixed_scalars_fall_back_to_text() {
        let batch = from_json_values("v", &[json!("a"), json!(7), json!(true)]).unwrap();
        assert_eq!(
            strings(&batch, "v"),
            vec![Some("a".into()), Some("7".into()), Some("true".into())]
        );
    }

    #[test]
    fn rejects_nested_values() {
        let err = from_json_values("v", &[json!("a"), json!({"k": 1})]).unwrap_err();
        match err {
            TableError::UnsupportedValue { index, kind, .. } => {
                assert_eq!(index, 1);
                assert_eq!(kind, "object");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn concatenates_existing_then_new_without_dedup() {
        let existing = from_json_values("image_url", &[json!("a"), json!("b")]).unwrap();
        let new = from_json_values("image_url", &[json!("b"), json!("c")]).unwrap();

        let merged = concat_tables(&existing, &new).unwrap();
        assert_eq!(merged.num_rows(), 4);
        assert_eq!(
            strings(&merged, "image_url"),
            vec![Some("a".into()), Some("b".into()), Some("b".into()), Some("c".into())]
        );
    }

    #[test]
    fn unions_drifted_schemas_by_name() {
        let existing = from_json_values("id", &[json!(1), json!(2)]).unwrap();
        let new = concat_tables(
            &from_json_values("id", &[json!("x")]).unwrap(),
            &from_json_values("note", &[json!("hello")]).unwrap(),
        )
        .unwrap();

        let merged = concat_tables(&existing, &new).unwrap();
        assert_eq!(column_names(&merged), vec!["id".to_string(), "note".to_string()]);
        assert_eq!(merged.num_rows(), 4);
        // id was Int64 on one side and Utf8 on the other
        assert_eq!(
            strings(&merged, "id"),
            vec![Some("1".into()), Some("2".into()), Some("x".into()), None]
        );
        assert_eq!(
            strings(&merged, "note"),
            vec![None, None, None, Some("hello".into())]
        );
    }
}
