//! Frame Data Model
//!
//! A [`Frame`] is an ordered list of equally long typed [`Field`]s plus
//! [`FrameMeta`]. It is the single output shape of the materializer and the
//! input of the response shaper.
//!
//! ## Wire form
//!
//! ```text
//! { "name": "", "meta": {...},
//!   "fields": [ {"name": "time", "type": "time", "nullable": false, "labels": {}} ],
//!   "values": [ ["2023-01-01T00:00:00Z", ...] ] }
//! ```

mod field;
pub mod wide;

pub use field::{Field, FieldData, FieldType, FieldVector, JsonText, Scalar};
pub use wide::{long_to_wide, time_series_type, TimeSeriesType, WideError};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Notice severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A message shown alongside the data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub severity: Severity,
    pub text: String,
}

impl Notice {
    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            text: text.into(),
        }
    }
}

/// Frame annotations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_query_string: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_topic: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<Notice>,

    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub custom: serde_json::Map<String, serde_json::Value>,
}

/// Ordered, equally long typed columns with metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub name: String,
    pub fields: Vec<Field>,
    pub meta: FrameMeta,
}

impl Frame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    /// Row count; every field has this length
    pub fn rows(&self) -> usize {
        self.fields.first().map_or(0, Field::len)
    }

    /// True if every field has the same length
    pub fn is_rectangular(&self) -> bool {
        let rows = self.rows();
        self.fields.iter().all(|f| f.len() == rows)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn append_notice(&mut self, notice: Notice) {
        self.meta.notices.push(notice);
    }

    /// Shorten every field to `rows`
    pub fn truncate(&mut self, rows: usize) {
        for field in &mut self.fields {
            field.data.truncate(rows);
        }
    }
}

#[derive(Serialize)]
struct FieldSchema<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    field_type: FieldType,
    nullable: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: &'a BTreeMap<String, String>,
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let schema: Vec<FieldSchema<'_>> = self
            .fields
            .iter()
            .map(|f| FieldSchema {
                name: &f.name,
                field_type: f.field_type(),
                nullable: f.is_nullable(),
                labels: &f.labels,
            })
            .collect();
        let values: Vec<&FieldData> = self.fields.iter().map(|f| &f.data).collect();

        let mut state = serializer.serialize_struct("Frame", 4)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("meta", &self.meta)?;
        state.serialize_field("fields", &schema)?;
        state.serialize_field("values", &values)?;
        state.end()
    }
}
