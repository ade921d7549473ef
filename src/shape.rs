//! Response Shaper
//!
//! Final layout of a materialized frame: tables and logs pass through
//! unchanged, time series require a `time` field and are reshaped from long to
//! wide when they carry series identity columns.

use crate::frame::{long_to_wide, time_series_type, Frame, TimeSeriesType, WideError};
use std::fmt;
use std::str::FromStr;

/// Name a field must have to be used as the time axis
pub const TIME_FIELD_NAME: &str = "time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    Table,
    #[default]
    TimeSeries,
    Logs,
}

impl Format {
    /// Format as sent by query clients: `table`, otherwise time series
    pub fn from_request(s: &str) -> Self {
        if s == "table" {
            Format::Table
        } else {
            Format::TimeSeries
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Table => "table",
            Format::TimeSeries => "time_series",
            Format::Logs => "logs",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(Format::Table),
            "time_series" | "timeseries" | "time-series" => Ok(Format::TimeSeries),
            "logs" => Ok(Format::Logs),
            other => Err(ShapeError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("no time column found")]
    NoTimeColumn,

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("convert long frame to wide: {0}")]
    Reshape(#[from] WideError),
}

/// Lay out `frame` for `format`
pub fn format_frame(frame: Frame, format: Format) -> Result<Vec<Frame>, ShapeError> {
    match format {
        Format::Table | Format::Logs => Ok(vec![frame]),
        Format::TimeSeries => {
            if frame.field_by_name(TIME_FIELD_NAME).is_none() {
                return Err(ShapeError::NoTimeColumn);
            }
            if time_series_type(&frame) == TimeSeriesType::Long {
                Ok(vec![long_to_wide(&frame)?])
            } else {
                Ok(vec![frame])
            }
        }
    }
}

/// Parse `format` strictly, then lay out `frame`
pub fn format_frame_str(frame: Frame, format: &str) -> Result<Vec<Frame>, ShapeError> {
    format_frame(frame, format.parse()?)
}
