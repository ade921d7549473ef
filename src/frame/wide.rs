//! Long to wide time series reshaping
//!
//! A *long* frame carries one row per (time, series) point, with the series
//! identified by its string or bool columns. A *wide* frame carries one row per
//! time and one numeric column per series, labelled with the series identity.

use super::{Field, FieldData, FieldType, Frame, Scalar};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Layout of a frame as a time series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSeriesType {
    /// No time field, or no numeric field
    Not,
    /// Time, numeric and string/bool fields
    Long,
    /// Time and numeric fields only
    Wide,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WideError {
    #[error("long frame has no time field")]
    NoTimeField,

    #[error("null time value at row {0}")]
    NullTime(usize),

    #[error("long frame must be sorted ascending by time, row {0} is out of order")]
    Unsorted(usize),
}

fn is_factor(field_type: FieldType) -> bool {
    matches!(field_type, FieldType::String | FieldType::Bool)
}

/// Classify a frame's layout
pub fn time_series_type(frame: &Frame) -> TimeSeriesType {
    let mut has_time = false;
    let mut has_value = false;
    let mut has_factor = false;
    for field in &frame.fields {
        let ft = field.field_type();
        has_time |= ft == FieldType::Time;
        has_value |= ft.is_numeric();
        has_factor |= is_factor(ft);
    }
    match (has_time, has_value, has_factor) {
        (true, true, true) => TimeSeriesType::Long,
        (true, true, false) => TimeSeriesType::Wide,
        _ => TimeSeriesType::Not,
    }
}

/// Reshape a long frame into a wide one.
///
/// The output has one non-null time field of distinct ascending times, then
/// one nullable field per series and numeric field. Series are ordered by
/// their label values; a time with no point for a series is null, and of two
/// points with the same time and series the later row wins.
pub fn long_to_wide(frame: &Frame) -> Result<Frame, WideError> {
    let time_idx = frame
        .fields
        .iter()
        .position(|f| f.field_type() == FieldType::Time)
        .ok_or(WideError::NoTimeField)?;
    let time_field = &frame.fields[time_idx];

    let value_idx: Vec<usize> = (0..frame.fields.len())
        .filter(|&i| frame.fields[i].field_type().is_numeric())
        .collect();
    let factor_idx: Vec<usize> = (0..frame.fields.len())
        .filter(|&i| is_factor(frame.fields[i].field_type()))
        .collect();

    // Distinct times and the time slot of every row
    let mut times: Vec<DateTime<Utc>> = Vec::new();
    let mut slot_of_row = Vec::with_capacity(frame.rows());
    for row in 0..frame.rows() {
        let t = match time_field.at(row) {
            Some(Scalar::Time(t)) => t,
            _ => return Err(WideError::NullTime(row)),
        };
        match times.last() {
            Some(last) if t < *last => return Err(WideError::Unsorted(row)),
            Some(last) if t == *last => {}
            _ => times.push(t),
        }
        slot_of_row.push(times.len() - 1);
    }

    // Series identity -> one cell grid per value field
    let mut series: BTreeMap<Vec<String>, Vec<Vec<Option<Scalar>>>> = BTreeMap::new();
    for (row, &slot) in slot_of_row.iter().enumerate() {
        let key: Vec<String> = factor_idx
            .iter()
            .map(|&i| {
                frame.fields[i]
                    .at(row)
                    .map(|s| s.label_value())
                    .unwrap_or_default()
            })
            .collect();
        let grids = series
            .entry(key)
            .or_insert_with(|| vec![vec![None; times.len()]; value_idx.len()]);
        for (grid, &vi) in grids.iter_mut().zip(&value_idx) {
            if let Some(value) = frame.fields[vi].at(row) {
                if !value.is_null() {
                    grid[slot] = Some(value);
                }
            }
        }
    }

    let mut time_out = Field::new(time_field.name.clone(), FieldType::Time, false);
    for t in &times {
        time_out.data.push_scalar(Scalar::Time(*t));
    }

    let mut fields = vec![time_out];
    for (key, grids) in series {
        let labels: BTreeMap<String, String> = factor_idx
            .iter()
            .map(|&i| frame.fields[i].name.clone())
            .zip(key)
            .collect();
        for (grid, &vi) in grids.into_iter().zip(&value_idx) {
            let source = &frame.fields[vi];
            let mut data = FieldData::new(source.field_type(), true);
            for cell in grid {
                data.push_scalar(cell.unwrap_or(Scalar::Null));
            }
            fields.push(Field {
                name: source.name.clone(),
                labels: labels.clone(),
                data,
            });
        }
    }

    let mut out = Frame::new(frame.name.clone()).with_fields(fields);
    out.meta = frame.meta.clone();
    Ok(out)
}
