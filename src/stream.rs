//! Header-Capturing Stream
//!
//! gRPC response headers are only readable from the underlying call once the
//! first message has been received. [`HeaderCapturingStream`] wraps any
//! [`RawStream`] and snapshots its headers exactly once, right after the first
//! `recv`, whether that receive succeeded or failed. The snapshot is shared
//! through [`CapturedHeaders`] so readers can fetch it after the stream itself
//! has been handed to the Arrow decoder.

use crate::materialize::RecordReader;
use crate::metadata::Metadata;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow_flight::decode::{DecodedPayload, FlightDataDecoder};
use arrow_flight::error::FlightError;
use arrow_flight::FlightData;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use std::sync::{Arc, OnceLock};
use tonic::metadata::{KeyAndValueRef, MetadataMap};
use tonic::Streaming;

/// A stream of messages with response headers
#[async_trait]
pub trait RawStream: Send {
    type Item: Send;

    /// Next message, `None` at end of stream
    async fn recv(&mut self) -> Result<Option<Self::Item>, FlightError>;

    /// Response headers of the call
    fn header(&self) -> Result<Metadata, FlightError>;
}

/// Run-once snapshot of a stream's headers
#[derive(Debug, Clone, Default)]
pub struct CapturedHeaders(Arc<OnceLock<Result<Metadata, String>>>);

impl CapturedHeaders {
    /// True once the first receive has happened
    pub fn is_captured(&self) -> bool {
        self.0.get().is_some()
    }

    /// The snapshot, or empty metadata before the first receive
    pub fn header(&self) -> Result<Metadata, FlightError> {
        match self.0.get() {
            None => Ok(Metadata::new()),
            Some(Ok(md)) => Ok(md.clone()),
            Some(Err(msg)) => Err(FlightError::ProtocolError(msg.clone())),
        }
    }

    fn capture(&self, f: impl FnOnce() -> Result<Metadata, FlightError>) {
        self.0.get_or_init(|| f().map_err(|e| e.to_string()));
    }
}

/// Wraps a [`RawStream`] and captures its headers on the first receive
pub struct HeaderCapturingStream<S> {
    inner: S,
    captured: CapturedHeaders,
}

impl<S: RawStream> HeaderCapturingStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            captured: CapturedHeaders::default(),
        }
    }

    /// Shared handle to the header snapshot
    pub fn captured_headers(&self) -> CapturedHeaders {
        self.captured.clone()
    }

    pub async fn recv(&mut self) -> Result<Option<S::Item>, FlightError> {
        let result = self.inner.recv().await;
        if !self.captured.is_captured() {
            let inner = &self.inner;
            self.captured.capture(|| inner.header());
        }
        result
    }

    pub fn header(&self) -> Result<Metadata, FlightError> {
        self.captured.header()
    }

    /// Adapt into a `Stream` that ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<S::Item, FlightError>> + Send + 'static
    where
        S: 'static,
    {
        futures_util::stream::unfold(Some(self), |state| async move {
            let mut this = state?;
            match this.recv().await {
                Ok(Some(item)) => Some((Ok(item), Some(this))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

/// `DoGet` response stream of a tonic call
pub struct TonicRawStream {
    headers: MetadataMap,
    stream: Streaming<FlightData>,
}

impl TonicRawStream {
    pub fn new(response: tonic::Response<Streaming<FlightData>>) -> Self {
        let (headers, stream, _) = response.into_parts();
        Self { headers, stream }
    }
}

#[async_trait]
impl RawStream for TonicRawStream {
    type Item = FlightData;

    async fn recv(&mut self) -> Result<Option<FlightData>, FlightError> {
        self.stream.message().await.map_err(FlightError::from)
    }

    fn header(&self) -> Result<Metadata, FlightError> {
        metadata_from_map(&self.headers)
    }
}

/// Convert tonic metadata, skipping binary entries
pub fn metadata_from_map(map: &MetadataMap) -> Result<Metadata, FlightError> {
    let mut md = Metadata::new();
    for entry in map.iter() {
        if let KeyAndValueRef::Ascii(key, value) = entry {
            let value = value.to_str().map_err(|e| {
                FlightError::ProtocolError(format!("header {}: {e}", key.as_str()))
            })?;
            md.append(key.as_str(), value);
        }
    }
    Ok(md)
}

/// Decodes `FlightData` into record batches, reading the schema on open
pub struct FlightRecordReader {
    schema: SchemaRef,
    decoder: FlightDataDecoder,
    headers: CapturedHeaders,
}

impl FlightRecordReader {
    pub async fn open<S>(stream: HeaderCapturingStream<S>) -> Result<Self, FlightError>
    where
        S: RawStream<Item = FlightData> + 'static,
    {
        let headers = stream.captured_headers();
        let mut decoder = FlightDataDecoder::new(stream.into_stream());

        let schema = loop {
            match decoder.next().await {
                Some(Ok(decoded)) => match decoded.payload {
                    DecodedPayload::Schema(schema) => break schema,
                    DecodedPayload::None => continue,
                    DecodedPayload::RecordBatch(_) => {
                        return Err(FlightError::ProtocolError(
                            "record batch received before schema".to_string(),
                        ))
                    }
                },
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(FlightError::ProtocolError(
                        "stream ended before schema".to_string(),
                    ))
                }
            }
        };

        Ok(Self {
            schema,
            decoder,
            headers,
        })
    }
}

#[async_trait]
impl RecordReader for FlightRecordReader {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    async fn next_batch(&mut self) -> Result<Option<RecordBatch>, FlightError> {
        while let Some(decoded) = self.decoder.next().await {
            match decoded?.payload {
                DecodedPayload::RecordBatch(batch) => return Ok(Some(batch)),
                DecodedPayload::Schema(schema) if schema != self.schema => {
                    return Err(FlightError::ProtocolError(
                        "schema changed mid-stream".to_string(),
                    ))
                }
                DecodedPayload::Schema(_) | DecodedPayload::None => {}
            }
        }
        Ok(None)
    }

    fn header(&self) -> Result<Metadata, FlightError> {
        self.headers.header()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockStream {
        items: VecDeque<Result<u32, FlightError>>,
        header_calls: Arc<AtomicUsize>,
        header_fails: bool,
    }

    impl MockStream {
        fn new(items: Vec<Result<u32, FlightError>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let stream = Self {
                items: items.into(),
                header_calls: calls.clone(),
                header_fails: false,
            };
            (stream, calls)
        }
    }

    #[async_trait]
    impl RawStream for MockStream {
        type Item = u32;

        async fn recv(&mut self) -> Result<Option<u32>, FlightError> {
            self.items.pop_front().transpose()
        }

        fn header(&self) -> Result<Metadata, FlightError> {
            let n = self.header_calls.fetch_add(1, Ordering::SeqCst);
            if self.header_fails {
                return Err(FlightError::ProtocolError("no headers".to_string()));
            }
            let mut md = Metadata::new();
            md.set("x-snapshot", n.to_string());
            Ok(md)
        }
    }

    #[tokio::test]
    async fn test_header_empty_before_first_recv() {
        let (mock, calls) = MockStream::new(vec![Ok(1)]);
        let stream = HeaderCapturingStream::new(mock);
        assert!(!stream.captured_headers().is_captured());
        assert!(stream.header().unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_header_captured_once() {
        let (mock, calls) = MockStream::new(vec![Ok(1), Ok(2), Ok(3)]);
        let mut stream = HeaderCapturingStream::new(mock);
        let handle = stream.captured_headers();

        while stream.recv().await.unwrap().is_some() {}

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_captured());
        assert_eq!(
            handle.header().unwrap().get("x-snapshot"),
            Some(&["0".to_string()][..])
        );
    }

    #[tokio::test]
    async fn test_header_captured_on_failed_first_recv() {
        let (mock, calls) = MockStream::new(vec![Err(FlightError::ProtocolError(
            "boom".to_string(),
        ))]);
        let mut stream = HeaderCapturingStream::new(mock);
        assert!(stream.recv().await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(stream.captured_headers().is_captured());
    }

    #[tokio::test]
    async fn test_header_error_is_kept() {
        let (mut mock, calls) = MockStream::new(vec![Ok(1), Ok(2)]);
        mock.header_fails = true;
        let mut stream = HeaderCapturingStream::new(mock);
        stream.recv().await.unwrap();
        stream.recv().await.unwrap();
        assert!(stream.header().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_into_stream_stops_after_error() {
        let (mock, _) = MockStream::new(vec![
            Ok(1),
            Err(FlightError::ProtocolError("x".to_string())),
            Ok(2),
        ]);
        let stream = HeaderCapturingStream::new(mock);
        let handle = stream.captured_headers();
        let items: Vec<_> = stream.into_stream().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
        assert!(handle.is_captured());
    }

    #[test]
    fn test_metadata_from_map() {
        let mut map = MetadataMap::new();
        map.insert("x-trace", "abc".parse().unwrap());
        map.append("x-trace", "def".parse().unwrap());
        let md = metadata_from_map(&map).unwrap();
        assert_eq!(
            md.get("x-trace"),
            Some(&["abc".to_string(), "def".to_string()][..])
        );
    }

    mod flight {
        use super::super::*;
        use crate::materialize::frame_for_records;
        use arrow::array::{ArrayRef, Int64Array, StringArray};
        use arrow::datatypes::{DataType, Field, Schema};
        use arrow_flight::encode::FlightDataEncoderBuilder;
        use futures_util::{stream, TryStreamExt};
        use std::collections::VecDeque;

        /// Pre-encoded messages with a fixed header
        struct EncodedStream {
            messages: VecDeque<FlightData>,
        }

        #[async_trait]
        impl RawStream for EncodedStream {
            type Item = FlightData;

            async fn recv(&mut self) -> Result<Option<FlightData>, FlightError> {
                Ok(self.messages.pop_front())
            }

            fn header(&self) -> Result<Metadata, FlightError> {
                let mut md = Metadata::new();
                md.set("x-h", "1");
                Ok(md)
            }
        }

        fn ids(range: std::ops::Range<i64>) -> RecordBatch {
            let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
            let col: ArrayRef = Arc::new(Int64Array::from_iter_values(range));
            RecordBatch::try_new(schema, vec![col]).unwrap()
        }

        fn names() -> RecordBatch {
            let schema = Arc::new(Schema::new(vec![Field::new("name", DataType::Utf8, false)]));
            let col: ArrayRef = Arc::new(StringArray::from(vec!["a"]));
            RecordBatch::try_new(schema, vec![col]).unwrap()
        }

        async fn encode(batches: Vec<RecordBatch>) -> Vec<FlightData> {
            FlightDataEncoderBuilder::new()
                .build(stream::iter(batches.into_iter().map(Ok)))
                .try_collect()
                .await
                .unwrap()
        }

        fn capturing(messages: Vec<FlightData>) -> HeaderCapturingStream<EncodedStream> {
            HeaderCapturingStream::new(EncodedStream {
                messages: messages.into(),
            })
        }

        #[tokio::test]
        async fn test_decodes_batches_and_headers() {
            let messages = encode(vec![ids(0..2), ids(2..3)]).await;
            let mut reader = FlightRecordReader::open(capturing(messages)).await.unwrap();
            assert_eq!(reader.schema().field(0).name(), "id");

            let frames = frame_for_records(&mut reader, usize::MAX).await.unwrap();
            assert_eq!(frames[0].rows(), 3);
            assert_eq!(
                reader.header().unwrap().get("x-h"),
                Some(&["1".to_string()][..])
            );
        }

        #[tokio::test]
        async fn test_schema_only_stream_has_no_rows() {
            let messages: Vec<FlightData> = FlightDataEncoderBuilder::new()
                .with_schema(ids(0..0).schema())
                .build(stream::iter(Vec::<Result<RecordBatch, FlightError>>::new()))
                .try_collect()
                .await
                .unwrap();
            let mut reader = FlightRecordReader::open(capturing(messages)).await.unwrap();
            assert!(reader.next_batch().await.unwrap().is_none());
            assert!(reader.header().unwrap().contains_key("x-h"));
        }

        #[tokio::test]
        async fn test_empty_stream_is_error() {
            let err = FlightRecordReader::open(capturing(Vec::new()))
                .await
                .err()
                .unwrap();
            assert!(err.to_string().contains("stream ended before schema"));
        }

        #[tokio::test]
        async fn test_batch_before_schema_is_error() {
            let mut messages = encode(vec![ids(0..2)]).await;
            messages.remove(0);
            assert!(FlightRecordReader::open(capturing(messages)).await.is_err());
        }

        #[tokio::test]
        async fn test_schema_change_is_error() {
            let mut messages = encode(vec![ids(0..2)]).await;
            messages.extend(encode(vec![names()]).await);
            let mut reader = FlightRecordReader::open(capturing(messages)).await.unwrap();

            assert_eq!(reader.next_batch().await.unwrap().unwrap().num_rows(), 2);
            let err = reader.next_batch().await.unwrap_err();
            assert!(err.to_string().contains("schema changed mid-stream"));
        }
    }
}
