//! `uuidv7()` and `uuid_v7_time(uuid)` scalar UDFs (C3, C7).

use datafusion::arrow::array::{Array, ArrayRef, StringArray};
use datafusion::arrow::datatypes::DataType;
use datafusion::error::DataFusionError;
use datafusion::logical_expr::{create_udf, ColumnarValue, Volatility};
use datafusion::prelude::SessionContext;
use std::sync::Arc;

use crate::id::{new_uuid_v7, to_canonical_string, uuid_v7_time_ms};

pub fn register(ctx: &SessionContext) {
    let uuidv7 = create_udf(
        "uuidv7",
        vec![],
        DataType::Utf8,
        Volatility::Volatile,
        Arc::new(|_args: &[ColumnarValue]| {
            Ok(ColumnarValue::Scalar(datafusion::scalar::ScalarValue::Utf8(Some(
                to_canonical_string(new_uuid_v7()),
            ))))
        }),
    );
    ctx.register_udf(uuidv7);

    let uuid_v7_time = create_udf(
        "uuid_v7_time",
        vec![DataType::Utf8],
        DataType::Int64,
        Volatility::Immutable,
        Arc::new(|args: &[ColumnarValue]| {
            let arrays: Vec<ArrayRef> = args
                .iter()
                .map(|a| a.clone().into_array(1))
                .collect::<Result<_, _>>()?;
            let input = arrays[0]
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| DataFusionError::Execution("uuid_v7_time expects a string".into()))?;

            let mut out = Vec::with_capacity(input.len());
            for i in 0..input.len() {
                if input.is_null(i) {
                    out.push(None);
                    continue;
                }
                let parsed = uuid::Uuid::parse_str(input.value(i))
                    .map_err(|e| DataFusionError::Execution(format!("invalid uuid: {e}")))?;
                out.push(uuid_v7_time_ms(parsed));
            }
            Ok(ColumnarValue::Array(Arc::new(
                datafusion::arrow::array::Int64Array::from(out),
            )))
        }),
    );
    ctx.register_udf(uuid_v7_time);
}
