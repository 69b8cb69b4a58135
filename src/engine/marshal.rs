//! Row marshalling: every scalar rendered as a string, SQL NULL as the
//! literal `"NULL"`. Grounded on `adapters/datafusion_handler.rs`'s
//! `array_value_to_json`, adapted to spec.md §4.3's string-only contract
//! instead of that handler's typed JSON values.

use datafusion::arrow::array::Array;
use datafusion::arrow::datatypes::DataType;
use datafusion::arrow::record_batch::RecordBatch;

pub struct ColumnMeta {
    pub name: String,
    pub data_type: String,
}

pub fn batches_to_rows(batches: &[RecordBatch]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for batch in batches {
        for row_idx in 0..batch.num_rows() {
            let mut row = Vec::with_capacity(batch.num_columns());
            for col in batch.columns() {
                row.push(array_value_to_string(col.as_ref(), row_idx));
            }
            rows.push(row);
        }
    }
    rows
}

pub fn schema_to_meta(batches: &[RecordBatch], fallback_schema: &datafusion::arrow::datatypes::SchemaRef) -> Vec<ColumnMeta> {
    let schema = batches.first().map(|b| b.schema()).unwrap_or_else(|| fallback_schema.clone());
    schema
        .fields()
        .iter()
        .map(|f| ColumnMeta {
            name: f.name().clone(),
            data_type: engine_type_name(f.data_type()),
        })
        .collect()
}

/// The uppercase engine-facing type name used both in result `meta` and as
/// the input to the Delta type mapping table (C4 §4.4.5).
pub fn engine_type_name(dt: &DataType) -> String {
    match dt {
        DataType::Boolean => "BOOLEAN".to_string(),
        DataType::Int8 | DataType::Int16 | DataType::Int32 => "INTEGER".to_string(),
        DataType::Int64 => "BIGINT".to_string(),
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 => "INTEGER".to_string(),
        DataType::UInt64 => "BIGINT".to_string(),
        DataType::Float32 => "FLOAT".to_string(),
        DataType::Float64 => "DOUBLE".to_string(),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => "VARCHAR".to_string(),
        DataType::Timestamp(_, _) => "TIMESTAMP".to_string(),
        DataType::List(field) if matches!(field.data_type(), DataType::Utf8) => "VARCHAR[]".to_string(),
        other => format!("{other:?}").to_uppercase(),
    }
}

fn array_value_to_string(array: &dyn Array, idx: usize) -> String {
    use datafusion::arrow::array::*;

    if array.is_null(idx) {
        return "NULL".to_string();
    }

    macro_rules! fmt_primitive {
        ($arr_ty:ty) => {{
            let a = array.as_any().downcast_ref::<$arr_ty>().unwrap();
            a.value(idx).to_string()
        }};
    }

    match array.data_type() {
        DataType::Boolean => fmt_primitive!(BooleanArray),
        DataType::Int8 => fmt_primitive!(Int8Array),
        DataType::Int16 => fmt_primitive!(Int16Array),
        DataType::Int32 => fmt_primitive!(Int32Array),
        DataType::Int64 => fmt_primitive!(Int64Array),
        DataType::UInt8 => fmt_primitive!(UInt8Array),
        DataType::UInt16 => fmt_primitive!(UInt16Array),
        DataType::UInt32 => fmt_primitive!(UInt32Array),
        DataType::UInt64 => fmt_primitive!(UInt64Array),
        DataType::Float32 => fmt_primitive!(Float32Array),
        DataType::Float64 => fmt_primitive!(Float64Array),
        DataType::Utf8 => array
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
            .value(idx)
            .to_string(),
        DataType::LargeUtf8 => array
            .as_any()
            .downcast_ref::<LargeStringArray>()
            .unwrap()
            .value(idx)
            .to_string(),
        DataType::Timestamp(_, _) => {
            datafusion::arrow::util::display::array_value_to_string(array, idx)
                .unwrap_or_else(|_| "NULL".to_string())
        }
        _ => datafusion::arrow::util::display::array_value_to_string(array, idx)
            .unwrap_or_else(|_| "NULL".to_string()),
    }
}
