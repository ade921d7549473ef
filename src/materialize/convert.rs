//! Arrow column to frame field conversion
//!
//! Every Arrow type maps onto one [`ColumnKind`], and every kind has exactly
//! one conversion selected by a single `match`.

use crate::frame::{FieldData, FieldType, FieldVector, JsonText};
use arrow::array::{Array, AsArray, UnionArray};
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, DurationMicrosecondType, DurationMillisecondType,
    DurationNanosecondType, DurationSecondType, Float32Type, Float64Type, Int16Type, Int32Type,
    Int64Type, Int8Type, TimeUnit, TimestampMicrosecondType, TimestampMillisecondType,
    TimestampNanosecondType, TimestampSecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Semantic type of a result column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    String,
    Bool,
    Timestamp(TimeUnit),
    Duration(TimeUnit),
    Union,
    /// Every other Arrow type, rendered as JSON per row
    Json,
}

impl ColumnKind {
    pub fn of(data_type: &DataType) -> Self {
        match data_type {
            DataType::Int8 => ColumnKind::Int8,
            DataType::Int16 => ColumnKind::Int16,
            DataType::Int32 => ColumnKind::Int32,
            DataType::Int64 => ColumnKind::Int64,
            DataType::UInt8 => ColumnKind::Uint8,
            DataType::UInt16 => ColumnKind::Uint16,
            DataType::UInt32 => ColumnKind::Uint32,
            DataType::UInt64 => ColumnKind::Uint64,
            DataType::Float32 => ColumnKind::Float32,
            DataType::Float64 => ColumnKind::Float64,
            DataType::Utf8 | DataType::LargeUtf8 => ColumnKind::String,
            DataType::Boolean => ColumnKind::Bool,
            DataType::Timestamp(unit, _) => ColumnKind::Timestamp(*unit),
            DataType::Duration(unit) => ColumnKind::Duration(*unit),
            DataType::Union(_, _) => ColumnKind::Union,
            _ => ColumnKind::Json,
        }
    }

    /// Frame field type produced by this kind
    pub fn field_type(self) -> FieldType {
        match self {
            ColumnKind::Int8 => FieldType::Int8,
            ColumnKind::Int16 => FieldType::Int16,
            ColumnKind::Int32 => FieldType::Int32,
            ColumnKind::Int64 | ColumnKind::Duration(_) => FieldType::Int64,
            ColumnKind::Uint8 => FieldType::Uint8,
            ColumnKind::Uint16 => FieldType::Uint16,
            ColumnKind::Uint32 => FieldType::Uint32,
            ColumnKind::Uint64 => FieldType::Uint64,
            ColumnKind::Float32 => FieldType::Float32,
            ColumnKind::Float64 => FieldType::Float64,
            ColumnKind::String => FieldType::String,
            ColumnKind::Bool => FieldType::Bool,
            ColumnKind::Timestamp(_) => FieldType::Time,
            ColumnKind::Union | ColumnKind::Json => FieldType::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("batch has {actual} columns, schema has {expected}")]
    ColumnCount { expected: usize, actual: usize },

    /// Column does not have the type its field was built for
    #[error("column type mismatch: field expects {expected:?}, column is {actual}")]
    TypeMismatch {
        expected: ColumnKind,
        actual: DataType,
    },

    #[error("timestamp {value} ({unit:?}) is out of range")]
    TimestampOutOfRange { value: i64, unit: TimeUnit },
}

fn mismatch(kind: ColumnKind, array: &dyn Array) -> ConvertError {
    ConvertError::TypeMismatch {
        expected: kind,
        actual: array.data_type().clone(),
    }
}

/// Append every row of `array` to `data`
pub fn append_column(
    data: &mut FieldData,
    kind: ColumnKind,
    array: &dyn Array,
) -> Result<(), ConvertError> {
    match (kind, data) {
        (ColumnKind::Int8, FieldData::Int8(v)) => copy_primitive::<Int8Type>(v, kind, array),
        (ColumnKind::Int16, FieldData::Int16(v)) => copy_primitive::<Int16Type>(v, kind, array),
        (ColumnKind::Int32, FieldData::Int32(v)) => copy_primitive::<Int32Type>(v, kind, array),
        (ColumnKind::Int64, FieldData::Int64(v)) => copy_primitive::<Int64Type>(v, kind, array),
        (ColumnKind::Uint8, FieldData::Uint8(v)) => copy_primitive::<UInt8Type>(v, kind, array),
        (ColumnKind::Uint16, FieldData::Uint16(v)) => {
            copy_primitive::<UInt16Type>(v, kind, array)
        }
        (ColumnKind::Uint32, FieldData::Uint32(v)) => {
            copy_primitive::<UInt32Type>(v, kind, array)
        }
        (ColumnKind::Uint64, FieldData::Uint64(v)) => {
            copy_primitive::<UInt64Type>(v, kind, array)
        }
        (ColumnKind::Float32, FieldData::Float32(v)) => {
            copy_primitive::<Float32Type>(v, kind, array)
        }
        (ColumnKind::Float64, FieldData::Float64(v)) => {
            copy_primitive::<Float64Type>(v, kind, array)
        }
        (ColumnKind::String, FieldData::String(v)) => copy_string(v, kind, array),
        (ColumnKind::Bool, FieldData::Bool(v)) => {
            let arr = array.as_boolean_opt().ok_or_else(|| mismatch(kind, array))?;
            v.reserve(arr.len());
            for i in 0..arr.len() {
                v.push(arr.is_valid(i).then(|| arr.value(i)));
            }
            Ok(())
        }
        (ColumnKind::Timestamp(unit), FieldData::Time(v)) => copy_timestamp(v, unit, array),
        (ColumnKind::Duration(unit), FieldData::Int64(v)) => match unit {
            TimeUnit::Second => copy_primitive::<DurationSecondType>(v, kind, array),
            TimeUnit::Millisecond => copy_primitive::<DurationMillisecondType>(v, kind, array),
            TimeUnit::Microsecond => copy_primitive::<DurationMicrosecondType>(v, kind, array),
            TimeUnit::Nanosecond => copy_primitive::<DurationNanosecondType>(v, kind, array),
        },
        (ColumnKind::Union, FieldData::Json(v)) => {
            let arr = array
                .as_any()
                .downcast_ref::<UnionArray>()
                .ok_or_else(|| mismatch(kind, array))?;
            v.reserve(arr.len());
            for i in 0..arr.len() {
                let child = arr.value(i);
                v.push(Some(JsonText::from(&union_child_json(child.as_ref()))));
            }
            Ok(())
        }
        (ColumnKind::Json, FieldData::Json(v)) => {
            v.reserve(array.len());
            for i in 0..array.len() {
                if array.is_null(i) {
                    v.push(None);
                } else {
                    v.push(Some(JsonText::from(&value_to_json(array, i))));
                }
            }
            Ok(())
        }
        _ => Err(mismatch(kind, array)),
    }
}

fn copy_primitive<T: ArrowPrimitiveType>(
    v: &mut FieldVector<T::Native>,
    kind: ColumnKind,
    array: &dyn Array,
) -> Result<(), ConvertError>
where
    T::Native: Default,
{
    let arr = array
        .as_primitive_opt::<T>()
        .ok_or_else(|| mismatch(kind, array))?;
    v.reserve(arr.len());
    for i in 0..arr.len() {
        v.push(arr.is_valid(i).then(|| arr.value(i)));
    }
    Ok(())
}

fn copy_string(
    v: &mut FieldVector<String>,
    kind: ColumnKind,
    array: &dyn Array,
) -> Result<(), ConvertError> {
    v.reserve(array.len());
    if let Some(arr) = array.as_string_opt::<i32>() {
        for i in 0..arr.len() {
            v.push(arr.is_valid(i).then(|| arr.value(i).to_string()));
        }
    } else if let Some(arr) = array.as_string_opt::<i64>() {
        for i in 0..arr.len() {
            v.push(arr.is_valid(i).then(|| arr.value(i).to_string()));
        }
    } else {
        return Err(mismatch(kind, array));
    }
    Ok(())
}

/// Instant of a raw timestamp in `unit`
pub fn timestamp_to_datetime(value: i64, unit: TimeUnit) -> Option<DateTime<Utc>> {
    let (per_second, nanos_per_unit) = match unit {
        TimeUnit::Second => (1, 1_000_000_000),
        TimeUnit::Millisecond => (1_000, 1_000_000),
        TimeUnit::Microsecond => (1_000_000, 1_000),
        TimeUnit::Nanosecond => (1_000_000_000, 1),
    };
    let secs = value.div_euclid(per_second);
    let nanos = u32::try_from(value.rem_euclid(per_second) * nanos_per_unit).ok()?;
    DateTime::from_timestamp(secs, nanos)
}

fn copy_timestamp(
    v: &mut FieldVector<DateTime<Utc>>,
    unit: TimeUnit,
    array: &dyn Array,
) -> Result<(), ConvertError> {
    let kind = ColumnKind::Timestamp(unit);
    let raw: Vec<Option<i64>> = match unit {
        TimeUnit::Second => raw_values::<TimestampSecondType>(array),
        TimeUnit::Millisecond => raw_values::<TimestampMillisecondType>(array),
        TimeUnit::Microsecond => raw_values::<TimestampMicrosecondType>(array),
        TimeUnit::Nanosecond => raw_values::<TimestampNanosecondType>(array),
    }
    .ok_or_else(|| mismatch(kind, array))?;

    v.reserve(raw.len());
    for value in raw {
        let ts = match value {
            Some(value) => Some(
                timestamp_to_datetime(value, unit)
                    .ok_or(ConvertError::TimestampOutOfRange { value, unit })?,
            ),
            None => None,
        };
        v.push(ts);
    }
    Ok(())
}

fn raw_values<T: ArrowPrimitiveType<Native = i64>>(array: &dyn Array) -> Option<Vec<Option<i64>>> {
    array
        .as_primitive_opt::<T>()
        .map(|arr| arr.iter().collect())
}

/// JSON of the active child value of one union row.
///
/// `child` is the one-element slice returned by `UnionArray::value`.
fn union_child_json(child: &dyn Array) -> Value {
    match child.data_type() {
        DataType::Utf8
        | DataType::LargeUtf8
        | DataType::Boolean
        | DataType::Int32
        | DataType::Int64
        | DataType::List(_)
        | DataType::LargeList(_) => value_to_json(child, 0),
        _ => Value::Null,
    }
}

/// Best-effort JSON of the value at `idx`
pub fn value_to_json(array: &dyn Array, idx: usize) -> Value {
    if idx >= array.len() || array.is_null(idx) {
        return Value::Null;
    }

    fn number<T: ArrowPrimitiveType>(array: &dyn Array, idx: usize) -> Value
    where
        T::Native: Into<Value>,
    {
        array
            .as_primitive_opt::<T>()
            .map_or(Value::Null, |a| a.value(idx).into())
    }

    match array.data_type() {
        DataType::Boolean => array
            .as_boolean_opt()
            .map_or(Value::Null, |a| Value::Bool(a.value(idx))),
        DataType::Int8 => number::<Int8Type>(array, idx),
        DataType::Int16 => number::<Int16Type>(array, idx),
        DataType::Int32 => number::<Int32Type>(array, idx),
        DataType::Int64 => number::<Int64Type>(array, idx),
        DataType::UInt8 => number::<UInt8Type>(array, idx),
        DataType::UInt16 => number::<UInt16Type>(array, idx),
        DataType::UInt32 => number::<UInt32Type>(array, idx),
        DataType::UInt64 => number::<UInt64Type>(array, idx),
        DataType::Float32 => number::<Float32Type>(array, idx),
        DataType::Float64 => number::<Float64Type>(array, idx),
        DataType::Utf8 => array
            .as_string_opt::<i32>()
            .map_or(Value::Null, |a| Value::String(a.value(idx).to_string())),
        DataType::LargeUtf8 => array
            .as_string_opt::<i64>()
            .map_or(Value::Null, |a| Value::String(a.value(idx).to_string())),
        DataType::List(_) => array
            .as_list_opt::<i32>()
            .map_or(Value::Null, |a| list_json(a.value(idx).as_ref())),
        DataType::LargeList(_) => array
            .as_list_opt::<i64>()
            .map_or(Value::Null, |a| list_json(a.value(idx).as_ref())),
        DataType::FixedSizeList(_, _) => array
            .as_fixed_size_list_opt()
            .map_or(Value::Null, |a| list_json(a.value(idx).as_ref())),
        DataType::Struct(fields) => match array.as_struct_opt() {
            Some(s) => Value::Object(
                fields
                    .iter()
                    .zip(s.columns())
                    .map(|(f, col)| (f.name().clone(), value_to_json(col.as_ref(), idx)))
                    .collect(),
            ),
            None => Value::Null,
        },
        _ => display_json(array, idx),
    }
}

fn list_json(values: &dyn Array) -> Value {
    Value::Array((0..values.len()).map(|i| value_to_json(values, i)).collect())
}

fn display_json(array: &dyn Array, idx: usize) -> Value {
    ArrayFormatter::try_new(array, &FormatOptions::default())
        .map_or(Value::Null, |f| Value::String(f.value(idx).to_string()))
}
