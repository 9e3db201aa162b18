// Wire Type Mapping
//
// Maps Arrow column types produced by semantic tables onto the PostgreSQL
// type identifiers used to describe result columns.

use datafusion::arrow::datatypes::{DataType, Schema};
use serde::Serialize;
use thiserror::Error;

/// Protocol-level column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PgType {
    Text,
    Int8,
    Float8,
    Bool,
    Date,
    Timestamp,
}

/// Arrow type with no wire representation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Column '{column}' has type {data_type} which has no wire type mapping")]
pub struct UnmappedTypeError {
    pub column: String,
    pub data_type: String,
}

impl PgType {
    /// PostgreSQL type OID
    pub fn oid(&self) -> u32 {
        match self {
            PgType::Text => 25,
            PgType::Int8 => 20,
            PgType::Float8 => 701,
            PgType::Bool => 16,
            PgType::Date => 1082,
            PgType::Timestamp => 1114,
        }
    }

    /// PostgreSQL type name
    pub fn name(&self) -> &'static str {
        match self {
            PgType::Text => "text",
            PgType::Int8 => "int8",
            PgType::Float8 => "float8",
            PgType::Bool => "bool",
            PgType::Date => "date",
            PgType::Timestamp => "timestamp",
        }
    }

    /// Map an Arrow data type to its wire type
    ///
    /// Unsigned 64-bit integers do not fit int8 and are rejected along with
    /// binary, nested, time-of-day and interval types.
    pub fn from_arrow(column: &str, data_type: &DataType) -> Result<Self, UnmappedTypeError> {
        let pg_type = match data_type {
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => PgType::Text,

            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32 => PgType::Int8,

            DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => PgType::Float8,

            DataType::Boolean => PgType::Bool,

            DataType::Date32 | DataType::Date64 => PgType::Date,

            DataType::Timestamp(_, _) => PgType::Timestamp,

            other => {
                return Err(UnmappedTypeError {
                    column: column.to_string(),
                    data_type: other.to_string(),
                })
            }
        };

        Ok(pg_type)
    }
}

/// Result column as announced to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescription {
    pub name: String,
    #[serde(rename = "type_oid")]
    pub oid: u32,
    #[serde(rename = "type_name")]
    pub type_name: &'static str,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, pg_type: PgType) -> Self {
        Self {
            name: name.into(),
            oid: pg_type.oid(),
            type_name: pg_type.name(),
        }
    }
}

/// Describe every field of an Arrow schema with its wire type
pub fn describe_schema(schema: &Schema) -> Result<Vec<ColumnDescription>, UnmappedTypeError> {
    schema
        .fields()
        .iter()
        .map(|field| {
            let pg_type = PgType::from_arrow(field.name(), field.data_type())?;
            Ok(ColumnDescription::new(field.name().clone(), pg_type))
        })
        .collect()
}
