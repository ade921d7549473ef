//! Record Materializer
//!
//! Drains a stream of Arrow record batches into one [`Frame`].
//!
//! ## Row cap
//!
//! Rows are counted across batches. The batch that would exceed the cap is
//! sliced to the remaining capacity, a single warning notice is attached and
//! draining stops. Hitting the cap is a success.
//!
//! ## Batch recovery
//!
//! Each batch is appended to all fields or to none. A batch whose columns do
//! not match the schema, or whose copy panics, is logged and skipped; fields
//! are rolled back to their pre-batch length so the frame stays rectangular.

mod convert;

pub use convert::{append_column, timestamp_to_datetime, value_to_json, ColumnKind, ConvertError};

use crate::frame::{Field, Frame, Notice};
use crate::metadata::Metadata;
use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow_flight::error::FlightError;
use async_trait::async_trait;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

/// Default maximum number of rows in one frame
pub const ROW_LIMIT: usize = 1_000_000;

/// A source of record batches sharing one schema
#[async_trait]
pub trait RecordReader: Send {
    fn schema(&self) -> SchemaRef;

    /// Next batch, `None` at clean end of stream
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>, FlightError>;

    /// Response headers of the underlying call
    fn header(&self) -> Result<Metadata, FlightError> {
        Ok(Metadata::new())
    }
}

/// In-memory [`RecordReader`], optionally failing after its batches
pub struct MemoryRecordReader {
    schema: SchemaRef,
    batches: VecDeque<RecordBatch>,
    error: Option<FlightError>,
    header: Metadata,
}

impl MemoryRecordReader {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self {
            schema,
            batches: batches.into(),
            error: None,
            header: Metadata::new(),
        }
    }

    /// Fail with `error` once the batches are drained
    pub fn with_error(mut self, error: FlightError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_header(mut self, header: Metadata) -> Self {
        self.header = header;
        self
    }
}

#[async_trait]
impl RecordReader for MemoryRecordReader {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    async fn next_batch(&mut self) -> Result<Option<RecordBatch>, FlightError> {
        if let Some(batch) = self.batches.pop_front() {
            return Ok(Some(batch));
        }
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    fn header(&self) -> Result<Metadata, FlightError> {
        Ok(self.header.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("{0}")]
    Stream(#[from] FlightError),

    #[error("column {column}: {source}")]
    Convert {
        column: String,
        #[source]
        source: ConvertError,
    },
}

/// Empty frame with one field per schema field
pub fn new_frame(schema: &Schema) -> Frame {
    let fields = schema
        .fields()
        .iter()
        .map(|f| {
            let kind = ColumnKind::of(f.data_type());
            Field::new(f.name().clone(), kind.field_type(), f.is_nullable())
        })
        .collect();
    Frame::new("").with_fields(fields)
}

/// Outcome of appending one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Keep reading
    Continue,
    /// Row cap reached; stop reading
    Full,
}

/// Incrementally builds a [`Frame`] from record batches
pub struct Materializer {
    frame: Frame,
    kinds: Vec<ColumnKind>,
    max_rows: usize,
    rows: usize,
}

impl Materializer {
    pub fn new(schema: &Schema, max_rows: usize) -> Self {
        Self {
            frame: new_frame(schema),
            kinds: schema
                .fields()
                .iter()
                .map(|f| ColumnKind::of(f.data_type()))
                .collect(),
            max_rows,
            rows: 0,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Append `batch`, slicing it at the row cap
    pub fn append_batch(&mut self, batch: &RecordBatch) -> Result<Progress, MaterializeError> {
        if self.rows >= self.max_rows {
            // Filled exactly by earlier batches; this one is the overflow
            if batch.num_rows() == 0 {
                return Ok(Progress::Continue);
            }
            self.append_limit_notice();
            return Ok(Progress::Full);
        }

        let remaining = self.max_rows - self.rows;
        let capped = batch.num_rows() > remaining;
        let batch = if capped {
            batch.slice(0, remaining)
        } else {
            batch.clone()
        };

        if let Err(e) = self.check_shape(&batch) {
            tracing::error!(error = %e, rows = batch.num_rows(), "record_batch_skipped");
            return Ok(Progress::Continue);
        }

        let before = self.rows;
        let copied = panic::catch_unwind(AssertUnwindSafe(|| self.copy_batch(&batch)));
        match copied {
            Ok(Ok(())) => {
                self.rows += batch.num_rows();
            }
            Ok(Err(e)) => {
                self.frame.truncate(before);
                return Err(e);
            }
            Err(payload) => {
                self.frame.truncate(before);
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    backtrace = %std::backtrace::Backtrace::force_capture(),
                    "record_batch_copy_panicked"
                );
                return Ok(Progress::Continue);
            }
        }

        if capped {
            self.append_limit_notice();
            return Ok(Progress::Full);
        }
        Ok(Progress::Continue)
    }

    fn append_limit_notice(&mut self) {
        self.frame.append_notice(Notice::warning(format!(
            "Results have been limited to {} because the SQL row limit was reached",
            self.max_rows
        )));
    }

    fn check_shape(&self, batch: &RecordBatch) -> Result<(), ConvertError> {
        if batch.num_columns() != self.kinds.len() {
            return Err(ConvertError::ColumnCount {
                expected: self.kinds.len(),
                actual: batch.num_columns(),
            });
        }
        for (kind, column) in self.kinds.iter().zip(batch.columns()) {
            if ColumnKind::of(column.data_type()) != *kind {
                return Err(ConvertError::TypeMismatch {
                    expected: *kind,
                    actual: column.data_type().clone(),
                });
            }
        }
        Ok(())
    }

    fn copy_batch(&mut self, batch: &RecordBatch) -> Result<(), MaterializeError> {
        for ((field, kind), column) in self
            .frame
            .fields
            .iter_mut()
            .zip(&self.kinds)
            .zip(batch.columns())
        {
            append_column(&mut field.data, *kind, column.as_ref()).map_err(|source| {
                MaterializeError::Convert {
                    column: field.name.clone(),
                    source,
                }
            })?;
        }
        Ok(())
    }

    pub fn finish(self) -> Frame {
        self.frame
    }
}

/// Drain `reader` into a single frame.
///
/// Returns no frames when the stream has no rows.
pub async fn frame_for_records(
    reader: &mut dyn RecordReader,
    max_rows: usize,
) -> Result<Vec<Frame>, MaterializeError> {
    let schema = reader.schema();
    let mut materializer = Materializer::new(&schema, max_rows);

    while let Some(batch) = reader.next_batch().await? {
        if materializer.append_batch(&batch)? == Progress::Full {
            break;
        }
    }

    if materializer.rows() == 0 {
        return Ok(Vec::new());
    }
    Ok(vec![materializer.finish()])
}

/// Text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
