//! Typed frame columns

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Output column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
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
    Time,
    Json,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Int8
                | FieldType::Int16
                | FieldType::Int32
                | FieldType::Int64
                | FieldType::Uint8
                | FieldType::Uint16
                | FieldType::Uint32
                | FieldType::Uint64
                | FieldType::Float32
                | FieldType::Float64
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::Int8 => "int8",
            FieldType::Int16 => "int16",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Uint8 => "uint8",
            FieldType::Uint16 => "uint16",
            FieldType::Uint32 => "uint32",
            FieldType::Uint64 => "uint64",
            FieldType::Float32 => "float32",
            FieldType::Float64 => "float64",
            FieldType::String => "string",
            FieldType::Bool => "bool",
            FieldType::Time => "time",
            FieldType::Json => "json",
        };
        f.write_str(s)
    }
}

/// A JSON document stored as text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonText(String);

impl JsonText {
    pub fn null() -> Self {
        JsonText("null".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JsonText {
    fn default() -> Self {
        Self::null()
    }
}

impl From<&serde_json::Value> for JsonText {
    fn from(value: &serde_json::Value) -> Self {
        JsonText(value.to_string())
    }
}

impl fmt::Display for JsonText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for JsonText {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Embed the document itself rather than its text
        let value: serde_json::Value =
            serde_json::from_str(&self.0).unwrap_or(serde_json::Value::Null);
        value.serialize(serializer)
    }
}

/// Column storage: plain values, or values with per-row nulls
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldVector<T> {
    Required(Vec<T>),
    Nullable(Vec<Option<T>>),
}

impl<T: Clone + Default> FieldVector<T> {
    pub fn new(nullable: bool) -> Self {
        if nullable {
            FieldVector::Nullable(Vec::new())
        } else {
            FieldVector::Required(Vec::new())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FieldVector::Required(v) => v.len(),
            FieldVector::Nullable(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, FieldVector::Nullable(_))
    }

    /// Append a value; a null in a required column stores the default value
    pub fn push(&mut self, value: Option<T>) {
        match self {
            FieldVector::Required(v) => v.push(value.unwrap_or_default()),
            FieldVector::Nullable(v) => v.push(value),
        }
    }

    /// Value at `idx`: `None` out of bounds, `Some(None)` for a null
    pub fn get(&self, idx: usize) -> Option<Option<&T>> {
        match self {
            FieldVector::Required(v) => v.get(idx).map(Some),
            FieldVector::Nullable(v) => v.get(idx).map(Option::as_ref),
        }
    }

    pub fn truncate(&mut self, len: usize) {
        match self {
            FieldVector::Required(v) => v.truncate(len),
            FieldVector::Nullable(v) => v.truncate(len),
        }
    }

    pub fn reserve(&mut self, additional: usize) {
        match self {
            FieldVector::Required(v) => v.reserve(additional),
            FieldVector::Nullable(v) => v.reserve(additional),
        }
    }
}

/// Dynamically typed cell value, used when reading a field back
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bool(bool),
    Time(DateTime<Utc>),
    Json(JsonText),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Text used when the value labels a series
    pub fn label_value(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Int8(v) => v.to_string(),
            Scalar::Int16(v) => v.to_string(),
            Scalar::Int32(v) => v.to_string(),
            Scalar::Int64(v) => v.to_string(),
            Scalar::Uint8(v) => v.to_string(),
            Scalar::Uint16(v) => v.to_string(),
            Scalar::Uint32(v) => v.to_string(),
            Scalar::Uint64(v) => v.to_string(),
            Scalar::Float32(v) => v.to_string(),
            Scalar::Float64(v) => v.to_string(),
            Scalar::String(v) => v.clone(),
            Scalar::Bool(v) => v.to_string(),
            Scalar::Time(v) => v.to_rfc3339(),
            Scalar::Json(v) => v.to_string(),
        }
    }
}

/// Dispatch `$body` over every [`FieldData`] variant with `$v` bound to the vector
macro_rules! each_vector {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            FieldData::Int8($v) => $body,
            FieldData::Int16($v) => $body,
            FieldData::Int32($v) => $body,
            FieldData::Int64($v) => $body,
            FieldData::Uint8($v) => $body,
            FieldData::Uint16($v) => $body,
            FieldData::Uint32($v) => $body,
            FieldData::Uint64($v) => $body,
            FieldData::Float32($v) => $body,
            FieldData::Float64($v) => $body,
            FieldData::String($v) => $body,
            FieldData::Bool($v) => $body,
            FieldData::Time($v) => $body,
            FieldData::Json($v) => $body,
        }
    };
}

/// Typed values of one field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldData {
    Int8(FieldVector<i8>),
    Int16(FieldVector<i16>),
    Int32(FieldVector<i32>),
    Int64(FieldVector<i64>),
    Uint8(FieldVector<u8>),
    Uint16(FieldVector<u16>),
    Uint32(FieldVector<u32>),
    Uint64(FieldVector<u64>),
    Float32(FieldVector<f32>),
    Float64(FieldVector<f64>),
    String(FieldVector<String>),
    Bool(FieldVector<bool>),
    Time(FieldVector<DateTime<Utc>>),
    Json(FieldVector<JsonText>),
}

impl FieldData {
    pub fn new(field_type: FieldType, nullable: bool) -> Self {
        match field_type {
            FieldType::Int8 => FieldData::Int8(FieldVector::new(nullable)),
            FieldType::Int16 => FieldData::Int16(FieldVector::new(nullable)),
            FieldType::Int32 => FieldData::Int32(FieldVector::new(nullable)),
            FieldType::Int64 => FieldData::Int64(FieldVector::new(nullable)),
            FieldType::Uint8 => FieldData::Uint8(FieldVector::new(nullable)),
            FieldType::Uint16 => FieldData::Uint16(FieldVector::new(nullable)),
            FieldType::Uint32 => FieldData::Uint32(FieldVector::new(nullable)),
            FieldType::Uint64 => FieldData::Uint64(FieldVector::new(nullable)),
            FieldType::Float32 => FieldData::Float32(FieldVector::new(nullable)),
            FieldType::Float64 => FieldData::Float64(FieldVector::new(nullable)),
            FieldType::String => FieldData::String(FieldVector::new(nullable)),
            FieldType::Bool => FieldData::Bool(FieldVector::new(nullable)),
            FieldType::Time => FieldData::Time(FieldVector::new(nullable)),
            FieldType::Json => FieldData::Json(FieldVector::new(nullable)),
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            FieldData::Int8(_) => FieldType::Int8,
            FieldData::Int16(_) => FieldType::Int16,
            FieldData::Int32(_) => FieldType::Int32,
            FieldData::Int64(_) => FieldType::Int64,
            FieldData::Uint8(_) => FieldType::Uint8,
            FieldData::Uint16(_) => FieldType::Uint16,
            FieldData::Uint32(_) => FieldType::Uint32,
            FieldData::Uint64(_) => FieldType::Uint64,
            FieldData::Float32(_) => FieldType::Float32,
            FieldData::Float64(_) => FieldType::Float64,
            FieldData::String(_) => FieldType::String,
            FieldData::Bool(_) => FieldType::Bool,
            FieldData::Time(_) => FieldType::Time,
            FieldData::Json(_) => FieldType::Json,
        }
    }

    pub fn len(&self) -> usize {
        each_vector!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_nullable(&self) -> bool {
        each_vector!(self, v => v.is_nullable())
    }

    pub fn truncate(&mut self, len: usize) {
        each_vector!(self, v => v.truncate(len));
    }

    pub fn reserve(&mut self, additional: usize) {
        each_vector!(self, v => v.reserve(additional));
    }

    /// Read the value at `idx` back as a [`Scalar`]
    pub fn at(&self, idx: usize) -> Option<Scalar> {
        fn read<T: Clone + Default>(
            v: &FieldVector<T>,
            idx: usize,
            wrap: fn(T) -> Scalar,
        ) -> Option<Scalar> {
            v.get(idx)
                .map(|cell| cell.map_or(Scalar::Null, |x| wrap(x.clone())))
        }

        match self {
            FieldData::Int8(v) => read(v, idx, Scalar::Int8),
            FieldData::Int16(v) => read(v, idx, Scalar::Int16),
            FieldData::Int32(v) => read(v, idx, Scalar::Int32),
            FieldData::Int64(v) => read(v, idx, Scalar::Int64),
            FieldData::Uint8(v) => read(v, idx, Scalar::Uint8),
            FieldData::Uint16(v) => read(v, idx, Scalar::Uint16),
            FieldData::Uint32(v) => read(v, idx, Scalar::Uint32),
            FieldData::Uint64(v) => read(v, idx, Scalar::Uint64),
            FieldData::Float32(v) => read(v, idx, Scalar::Float32),
            FieldData::Float64(v) => read(v, idx, Scalar::Float64),
            FieldData::String(v) => read(v, idx, Scalar::String),
            FieldData::Bool(v) => read(v, idx, Scalar::Bool),
            FieldData::Time(v) => read(v, idx, Scalar::Time),
            FieldData::Json(v) => read(v, idx, Scalar::Json),
        }
    }

    /// Append a [`Scalar`]; returns `false` if its type does not match
    pub fn push_scalar(&mut self, value: Scalar) -> bool {
        match (self, value) {
            (data, Scalar::Null) => {
                each_vector!(data, v => v.push(None));
                true
            }
            (FieldData::Int8(v), Scalar::Int8(x)) => push_some(v, x),
            (FieldData::Int16(v), Scalar::Int16(x)) => push_some(v, x),
            (FieldData::Int32(v), Scalar::Int32(x)) => push_some(v, x),
            (FieldData::Int64(v), Scalar::Int64(x)) => push_some(v, x),
            (FieldData::Uint8(v), Scalar::Uint8(x)) => push_some(v, x),
            (FieldData::Uint16(v), Scalar::Uint16(x)) => push_some(v, x),
            (FieldData::Uint32(v), Scalar::Uint32(x)) => push_some(v, x),
            (FieldData::Uint64(v), Scalar::Uint64(x)) => push_some(v, x),
            (FieldData::Float32(v), Scalar::Float32(x)) => push_some(v, x),
            (FieldData::Float64(v), Scalar::Float64(x)) => push_some(v, x),
            (FieldData::String(v), Scalar::String(x)) => push_some(v, x),
            (FieldData::Bool(v), Scalar::Bool(x)) => push_some(v, x),
            (FieldData::Time(v), Scalar::Time(x)) => push_some(v, x),
            (FieldData::Json(v), Scalar::Json(x)) => push_some(v, x),
            _ => false,
        }
    }
}

fn push_some<T: Clone + Default>(v: &mut FieldVector<T>, x: T) -> bool {
    v.push(Some(x));
    true
}

/// A named, typed column of a frame
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub data: FieldData,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            data: FieldData::new(field_type, nullable),
        }
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.data.field_type()
    }

    pub fn is_nullable(&self) -> bool {
        self.data.is_nullable()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn at(&self, idx: usize) -> Option<Scalar> {
        self.data.at(idx)
    }
}
