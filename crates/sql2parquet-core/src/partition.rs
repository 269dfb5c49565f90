//! Partition key derivation
//!
//! A batch is routed to `year={Y}/month={M}/day={D}` by reading one
//! date-valued column. Batches that straddle calendar days are either rejected
//! (`derive_partition_key`) or resplit (`split_by_partition`); the first value
//! is never silently taken as representative of the whole batch.

use std::fmt;

use arrow::array::{Array, AsArray, BooleanArray, RecordBatch};
use arrow::compute::filter_record_batch;
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Date32Type, Date64Type, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType,
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::PartitionError;

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Calendar date used to route a batch to its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl PartitionKey {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "year={}/month={}/day={}",
            self.year, self.month, self.day
        )
    }
}

/// Derive the single partition key of `batch` from `date_column`.
///
/// Fails with [`PartitionError::MixedPartition`] when the batch holds more
/// than one distinct calendar day.
pub fn derive_partition_key(
    batch: &RecordBatch,
    date_column: &str,
) -> Result<PartitionKey, PartitionError> {
    if batch.num_rows() == 0 {
        return Err(PartitionError::EmptyBatch);
    }

    let reader = DateReader::new(batch, date_column)?;
    let first_day = reader.day_at(0)?;
    let first = reader.key_for_day(first_day, 0)?;

    for row in 1..batch.num_rows() {
        let day = reader.day_at(row)?;
        if day != first_day {
            return Err(PartitionError::MixedPartition {
                first,
                other: reader.key_for_day(day, row)?,
                row,
            });
        }
    }

    Ok(first)
}

/// Split `batch` into one sub-batch per calendar day of `date_column`.
///
/// Groups are returned in first-seen order and keep the original row order.
/// A batch with a single day is returned as-is without copying columns.
pub fn split_by_partition(
    batch: &RecordBatch,
    date_column: &str,
) -> Result<Vec<(PartitionKey, RecordBatch)>, PartitionError> {
    if batch.num_rows() == 0 {
        return Err(PartitionError::EmptyBatch);
    }

    let reader = DateReader::new(batch, date_column)?;
    let days = (0..batch.num_rows())
        .map(|row| reader.day_at(row))
        .collect::<Result<Vec<_>, _>>()?;

    let mut distinct: Vec<(i64, usize)> = Vec::new();
    for (row, day) in days.iter().enumerate() {
        if !distinct.iter().any(|(seen, _)| seen == day) {
            distinct.push((*day, row));
        }
    }

    if distinct.len() == 1 {
        let (day, row) = distinct[0];
        return Ok(vec![(reader.key_for_day(day, row)?, batch.clone())]);
    }

    tracing::debug!(
        rows = batch.num_rows(),
        partitions = distinct.len(),
        "Splitting batch by partition key"
    );

    distinct
        .into_iter()
        .map(|(day, first_row)| {
            let key = reader.key_for_day(day, first_row)?;
            let mask: BooleanArray = days.iter().map(|d| Some(*d == day)).collect();
            let part = filter_record_batch(batch, &mask)?;
            Ok((key, part))
        })
        .collect()
}

/// Reads a date-like column as whole days since the Unix epoch
struct DateReader<'a> {
    column_name: &'a str,
    array: &'a dyn Array,
    values: DateValues<'a>,
}

enum DateValues<'a> {
    Days(&'a [i32]),
    Ticks { values: &'a [i64], per_day: i64 },
}

impl<'a> DateReader<'a> {
    fn new(batch: &'a RecordBatch, column_name: &'a str) -> Result<Self, PartitionError> {
        let array = batch
            .column_by_name(column_name)
            .ok_or_else(|| PartitionError::MissingColumn {
                column: column_name.to_string(),
            })?
            .as_ref();

        let values = match array.data_type() {
            DataType::Date32 => DateValues::Days(array.as_primitive::<Date32Type>().values()),
            DataType::Date64 => DateValues::Ticks {
                values: ticks::<Date64Type>(array),
                per_day: MILLIS_PER_DAY,
            },
            DataType::Timestamp(unit, _) => {
                let values = match unit {
                    TimeUnit::Second => ticks::<TimestampSecondType>(array),
                    TimeUnit::Millisecond => ticks::<TimestampMillisecondType>(array),
                    TimeUnit::Microsecond => ticks::<TimestampMicrosecondType>(array),
                    TimeUnit::Nanosecond => ticks::<TimestampNanosecondType>(array),
                };
                DateValues::Ticks {
                    values,
                    per_day: ticks_per_day(unit),
                }
            }
            other => {
                return Err(PartitionError::UnsupportedType {
                    column: column_name.to_string(),
                    data_type: other.clone(),
                })
            }
        };

        Ok(Self {
            column_name,
            array,
            values,
        })
    }

    fn day_at(&self, row: usize) -> Result<i64, PartitionError> {
        if self.array.is_null(row) {
            return Err(PartitionError::NullValue {
                column: self.column_name.to_string(),
                row,
            });
        }

        Ok(match self.values {
            DateValues::Days(days) => i64::from(days[row]),
            DateValues::Ticks { values, per_day } => values[row].div_euclid(per_day),
        })
    }

    fn key_for_day(&self, day: i64, row: usize) -> Result<PartitionKey, PartitionError> {
        day.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(|ce| i32::try_from(ce).ok())
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(PartitionKey::from_date)
            .ok_or_else(|| PartitionError::OutOfRange {
                column: self.column_name.to_string(),
                row,
            })
    }
}

fn ticks<T: ArrowPrimitiveType<Native = i64>>(array: &dyn Array) -> &[i64] {
    array.as_primitive::<T>().values()
}

fn ticks_per_day(unit: &TimeUnit) -> i64 {
    match unit {
        TimeUnit::Second => 86_400,
        TimeUnit::Millisecond => MILLIS_PER_DAY,
        TimeUnit::Microsecond => MILLIS_PER_DAY * 1_000,
        TimeUnit::Nanosecond => MILLIS_PER_DAY * 1_000_000,
    }
}
