// DataFusion ResultConverter
//
// Converts Arrow record batches produced by semantic tables into JSON rows for
// the wire protocol.

use datafusion::arrow::array::*;
use datafusion::arrow::datatypes::{DataType, TimeUnit};
use datafusion::arrow::record_batch::RecordBatch;
use serde_json::{json, Value as JsonValue};
use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate};

use crate::models::ResultBatch;

/// Converts query results to JSON rows
///
/// Covers the Arrow types that have a wire type mapping; anything else is an
/// error rather than a placeholder value.
pub struct DataFusionResultConverter;

impl DataFusionResultConverter {
    /// Convert every batch of a result into rows of JSON values
    pub fn batch_rows(result: &ResultBatch) -> Result<Vec<Vec<JsonValue>>> {
        let mut all_rows = Vec::with_capacity(result.row_count());
        for batch in &result.batches {
            all_rows.extend(Self::record_batch_rows(batch)?);
        }
        Ok(all_rows)
    }

    /// Convert a single RecordBatch to JSON rows
    fn record_batch_rows(batch: &RecordBatch) -> Result<Vec<Vec<JsonValue>>> {
        let num_rows = batch.num_rows();
        let num_cols = batch.num_columns();
        let schema = batch.schema();

        let mut rows = Vec::with_capacity(num_rows);

        for row_idx in 0..num_rows {
            let mut row = Vec::with_capacity(num_cols);

            for col_idx in 0..num_cols {
                let column = batch.column(col_idx);
                let field = schema.field(col_idx);

                row.push(Self::array_value_to_json(column, row_idx, field.data_type())?);
            }

            rows.push(row);
        }

        Ok(rows)
    }

    /// Convert a single array value to JSON
    fn array_value_to_json(
        array: &ArrayRef,
        row_idx: usize,
        data_type: &DataType,
    ) -> Result<JsonValue> {
        if array.is_null(row_idx) {
            return Ok(JsonValue::Null);
        }

        let value = match data_type {
            DataType::Boolean => json!(downcast::<BooleanArray>(array)?.value(row_idx)),

            DataType::Int8 => json!(downcast::<Int8Array>(array)?.value(row_idx)),
            DataType::Int16 => json!(downcast::<Int16Array>(array)?.value(row_idx)),
            DataType::Int32 => json!(downcast::<Int32Array>(array)?.value(row_idx)),
            DataType::Int64 => json!(downcast::<Int64Array>(array)?.value(row_idx)),
            DataType::UInt8 => json!(downcast::<UInt8Array>(array)?.value(row_idx)),
            DataType::UInt16 => json!(downcast::<UInt16Array>(array)?.value(row_idx)),
            DataType::UInt32 => json!(downcast::<UInt32Array>(array)?.value(row_idx)),

            DataType::Float16 => json!(downcast::<Float16Array>(array)?.value(row_idx).to_f64()),
            DataType::Float32 => json!(downcast::<Float32Array>(array)?.value(row_idx)),
            DataType::Float64 => json!(downcast::<Float64Array>(array)?.value(row_idx)),

            DataType::Decimal128(_, scale) => {
                let value = downcast::<Decimal128Array>(array)?.value(row_idx);
                json!(value as f64 / 10_f64.powi(*scale as i32))
            }
            DataType::Decimal256(_, _) => {
                let array = downcast::<Decimal256Array>(array)?;
                let text = array.value_as_string(row_idx);
                let value: f64 = text
                    .parse()
                    .map_err(|e| anyhow!("Invalid decimal value '{}': {}", text, e))?;
                json!(value)
            }

            DataType::Utf8 => json!(downcast::<StringArray>(array)?.value(row_idx)),
            DataType::LargeUtf8 => json!(downcast::<LargeStringArray>(array)?.value(row_idx)),
            DataType::Utf8View => json!(downcast::<StringViewArray>(array)?.value(row_idx)),

            DataType::Date32 => {
                let days = downcast::<Date32Array>(array)?.value(row_idx);
                // Date32 is days since Unix epoch
                let date = NaiveDate::from_num_days_from_ce_opt(days + 719_163)
                    .ok_or_else(|| anyhow!("Invalid date value"))?;
                json!(date.format("%Y-%m-%d").to_string())
            }
            DataType::Date64 => {
                let millis = downcast::<Date64Array>(array)?.value(row_idx);
                let datetime = DateTime::from_timestamp_millis(millis)
                    .ok_or_else(|| anyhow!("Invalid date value"))?;
                json!(datetime.format("%Y-%m-%d").to_string())
            }

            DataType::Timestamp(unit, _) => {
                let timestamp = match unit {
                    TimeUnit::Second => DateTime::from_timestamp(
                        downcast::<TimestampSecondArray>(array)?.value(row_idx),
                        0,
                    ),
                    TimeUnit::Millisecond => DateTime::from_timestamp_millis(
                        downcast::<TimestampMillisecondArray>(array)?.value(row_idx),
                    ),
                    TimeUnit::Microsecond => DateTime::from_timestamp_micros(
                        downcast::<TimestampMicrosecondArray>(array)?.value(row_idx),
                    ),
                    TimeUnit::Nanosecond => Some(DateTime::from_timestamp_nanos(
                        downcast::<TimestampNanosecondArray>(array)?.value(row_idx),
                    )),
                };

                let dt = timestamp.ok_or_else(|| anyhow!("Invalid timestamp value"))?;
                json!(dt.to_rfc3339())
            }

            other => return Err(anyhow!("Unsupported Arrow data type: {:?}", other)),
        };

        Ok(value)
    }
}

fn downcast<T: 'static>(array: &ArrayRef) -> Result<&T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| anyhow!("Failed to downcast to {}", std::any::type_name::<T>()))
}
