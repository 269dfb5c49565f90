//! PostgreSQL rows to Arrow record batches
//!
//! The Arrow schema is fixed from the prepared statement's column list before
//! the first page is fetched, so every page of a run shares one schema and an
//! unsupported column fails the run before any rows move.
//!
//! | PostgreSQL                      | Arrow                       |
//! |---------------------------------|-----------------------------|
//! | bool                            | Boolean                     |
//! | int2 / int4 / int8              | Int16 / Int32 / Int64       |
//! | float4 / float8                 | Float32 / Float64           |
//! | numeric                         | Utf8 (decimal text)         |
//! | text, varchar, bpchar, name     | Utf8                        |
//! | bytea                           | Binary                      |
//! | date                            | Date32                      |
//! | time                            | Time64(µs)                  |
//! | timestamp                       | Timestamp(µs)               |
//! | timestamptz                     | Timestamp(µs, "UTC")        |
//! | uuid, json, jsonb               | Utf8                        |

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BinaryArray, BooleanArray, Date32Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, RecordBatch, StringArray, Time64MicrosecondArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Column, Row};

use super::numeric::NumericText;
use crate::SourceError;

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Decoding strategy for one result column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Bytea,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
}

impl ColumnKind {
    pub fn from_pg_type(ty: &Type) -> Option<Self> {
        let kind = match *ty {
            Type::BOOL => ColumnKind::Bool,
            Type::INT2 => ColumnKind::Int2,
            Type::INT4 => ColumnKind::Int4,
            Type::INT8 => ColumnKind::Int8,
            Type::FLOAT4 => ColumnKind::Float4,
            Type::FLOAT8 => ColumnKind::Float8,
            Type::NUMERIC => ColumnKind::Numeric,
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => ColumnKind::Text,
            Type::BYTEA => ColumnKind::Bytea,
            Type::DATE => ColumnKind::Date,
            Type::TIME => ColumnKind::Time,
            Type::TIMESTAMP => ColumnKind::Timestamp,
            Type::TIMESTAMPTZ => ColumnKind::TimestampTz,
            Type::UUID => ColumnKind::Uuid,
            Type::JSON | Type::JSONB => ColumnKind::Json,
            _ => return None,
        };
        Some(kind)
    }

    pub fn arrow_type(self) -> DataType {
        match self {
            ColumnKind::Bool => DataType::Boolean,
            ColumnKind::Int2 => DataType::Int16,
            ColumnKind::Int4 => DataType::Int32,
            ColumnKind::Int8 => DataType::Int64,
            ColumnKind::Float4 => DataType::Float32,
            ColumnKind::Float8 => DataType::Float64,
            ColumnKind::Numeric
            | ColumnKind::Text
            | ColumnKind::Uuid
            | ColumnKind::Json => DataType::Utf8,
            ColumnKind::Bytea => DataType::Binary,
            ColumnKind::Date => DataType::Date32,
            ColumnKind::Time => DataType::Time64(TimeUnit::Microsecond),
            ColumnKind::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            ColumnKind::TimestampTz => {
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
            }
        }
    }
}

/// Arrow schema plus per-column decoders for one query
#[derive(Debug, Clone)]
pub struct RowLayout {
    schema: SchemaRef,
    kinds: Vec<ColumnKind>,
}

impl RowLayout {
    pub fn from_columns(columns: &[Column]) -> Result<Self, SourceError> {
        let pairs = columns
            .iter()
            .map(|column| (column.name(), column.type_()))
            .collect::<Vec<_>>();
        Self::from_types(&pairs)
    }

    pub fn from_types(columns: &[(&str, &Type)]) -> Result<Self, SourceError> {
        let mut fields = Vec::with_capacity(columns.len());
        let mut kinds = Vec::with_capacity(columns.len());

        for (name, ty) in columns {
            let kind = ColumnKind::from_pg_type(ty).ok_or_else(|| SourceError::UnsupportedType {
                column: name.to_string(),
                type_name: ty.name().to_string(),
            })?;
            fields.push(Field::new(*name, kind.arrow_type(), true));
            kinds.push(kind);
        }

        Ok(Self {
            schema: Arc::new(Schema::new(fields)),
            kinds,
        })
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Decode one page of rows column by column.
    pub fn to_batch(&self, rows: &[Row]) -> Result<RecordBatch, SourceError> {
        let columns = self
            .kinds
            .iter()
            .enumerate()
            .map(|(idx, kind)| self.decode_column(rows, idx, *kind))
            .collect::<Result<Vec<ArrayRef>, SourceError>>()?;

        Ok(RecordBatch::try_new(self.schema(), columns)?)
    }

    fn decode_column(
        &self,
        rows: &[Row],
        idx: usize,
        kind: ColumnKind,
    ) -> Result<ArrayRef, SourceError> {
        let name = self.schema.field(idx).name();

        let array: ArrayRef = match kind {
            ColumnKind::Bool => Arc::new(BooleanArray::from(values::<bool>(rows, idx, name)?)),
            ColumnKind::Int2 => Arc::new(Int16Array::from(values::<i16>(rows, idx, name)?)),
            ColumnKind::Int4 => Arc::new(Int32Array::from(values::<i32>(rows, idx, name)?)),
            ColumnKind::Int8 => Arc::new(Int64Array::from(values::<i64>(rows, idx, name)?)),
            ColumnKind::Float4 => Arc::new(Float32Array::from(values::<f32>(rows, idx, name)?)),
            ColumnKind::Float8 => Arc::new(Float64Array::from(values::<f64>(rows, idx, name)?)),
            ColumnKind::Numeric => Arc::new(text_array(values::<NumericText>(rows, idx, name)?)),
            ColumnKind::Text => Arc::new(StringArray::from(values::<String>(rows, idx, name)?)),
            ColumnKind::Bytea => Arc::new(
                values::<Vec<u8>>(rows, idx, name)?
                    .into_iter()
                    .collect::<BinaryArray>(),
            ),
            ColumnKind::Date => Arc::new(Date32Array::from(
                values::<NaiveDate>(rows, idx, name)?
                    .into_iter()
                    .map(|date| date.map(days_since_epoch))
                    .collect::<Vec<_>>(),
            )),
            ColumnKind::Time => Arc::new(Time64MicrosecondArray::from(
                values::<NaiveTime>(rows, idx, name)?
                    .into_iter()
                    .map(|time| time.map(micros_since_midnight))
                    .collect::<Vec<_>>(),
            )),
            ColumnKind::Timestamp => Arc::new(TimestampMicrosecondArray::from(
                values::<NaiveDateTime>(rows, idx, name)?
                    .into_iter()
                    .map(|ts| ts.map(|ts| ts.and_utc().timestamp_micros()))
                    .collect::<Vec<_>>(),
            )),
            ColumnKind::TimestampTz => Arc::new(
                TimestampMicrosecondArray::from(
                    values::<DateTime<Utc>>(rows, idx, name)?
                        .into_iter()
                        .map(|ts| ts.map(|ts| ts.timestamp_micros()))
                        .collect::<Vec<_>>(),
                )
                .with_timezone("UTC"),
            ),
            ColumnKind::Uuid => Arc::new(text_array(values::<uuid::Uuid>(rows, idx, name)?)),
            ColumnKind::Json => {
                Arc::new(text_array(values::<serde_json::Value>(rows, idx, name)?))
            }
        };

        Ok(array)
    }
}

fn values<'a, T>(rows: &'a [Row], idx: usize, column: &str) -> Result<Vec<Option<T>>, SourceError>
where
    T: FromSql<'a>,
{
    rows.iter()
        .map(|row| {
            row.try_get::<_, Option<T>>(idx)
                .map_err(|source| SourceError::Decode {
                    column: column.to_string(),
                    source,
                })
        })
        .collect()
}

fn text_array<T: ToString>(values: Vec<Option<T>>) -> StringArray {
    values
        .into_iter()
        .map(|value| value.map(|value| value.to_string()))
        .collect()
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn micros_since_midnight(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight()) * 1_000_000 + i64::from(time.nanosecond() / 1_000)
}
