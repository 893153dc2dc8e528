//! # Sink Module
//!
//! Destinations for stamped readings.
//!
//! Two kinds of sink exist and are never merged into one object:
//! - [`TextSink`]: JSON telemetry records on a line-oriented writer (stdout)
//! - [`FrameSink`]: image payloads as binary frames on a [`FrameTransport`]
//!
//! [`ChannelSink`] lets several sample loops share one text writer: each loop
//! hands finished records to a single writer task, so records never interleave.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Result, TelemetryError};
use crate::protocol::record::{encode_metadata, encode_record};
use crate::sensor::{Reading, StampedReading};
use crate::stream::FrameTransport;

/// Capacity of the record channel shared by multiplexed loops
pub const RECORD_CHANNEL_CAPACITY: usize = 64;

/// Destination for stamped readings
#[async_trait]
pub trait Sink: Send {
    /// Encode and deliver one reading
    async fn emit(&mut self, stamped: StampedReading) -> Result<()>;

    /// Graceful end of the session
    async fn finish(&mut self) -> Result<()>;

    /// Error path: release resources without end-of-stream signalling
    async fn abort(&mut self) {}
}

/// Write one document and flush it immediately
async fn write_document<W>(writer: &mut W, document: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    writer.write_all(document).await?;
    writer.flush().await?;
    Ok(())
}

/// JSON telemetry records on a text writer
pub struct TextSink<W = Stdout> {
    writer: W,
    records: u64,
}

impl TextSink<Stdout> {
    /// Sink writing to the process's standard output
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    /// Number of records written
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Consume the sink, returning the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Sink for TextSink<W> {
    async fn emit(&mut self, stamped: StampedReading) -> Result<()> {
        let document = encode_record(&stamped)?;
        write_document(&mut self.writer, &document).await?;
        self.records += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.writer.flush().await?;
        debug!("Text sink finished after {} records", self.records);
        Ok(())
    }
}

/// Image payloads as frames, with optional timing metadata on a text writer
pub struct FrameSink<T, M = Stdout> {
    transport: T,
    metadata: Option<M>,
    frames: u64,
}

impl<T: FrameTransport> FrameSink<T, Stdout> {
    /// Frame sink without metadata output
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            metadata: None,
            frames: 0,
        }
    }
}

impl<T: FrameTransport, M: AsyncWrite + Unpin + Send> FrameSink<T, M> {
    /// Frame sink that also writes `{timestamp, index}` per frame to `metadata`
    pub fn with_metadata(transport: T, metadata: M) -> Self {
        Self {
            transport,
            metadata: Some(metadata),
            frames: 0,
        }
    }

    /// Number of frames sent
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[async_trait]
impl<T: FrameTransport, M: AsyncWrite + Unpin + Send> Sink for FrameSink<T, M> {
    async fn emit(&mut self, stamped: StampedReading) -> Result<()> {
        let image = match &stamped.reading {
            Reading::ImageFrame(image) => image,
            other => return Err(TelemetryError::UnsupportedReading(other.kind())),
        };

        self.transport.send(image).await?;
        self.frames += 1;

        if let Some(metadata) = self.metadata.as_mut() {
            let document = encode_metadata(&stamped)?;
            write_document(metadata, &document).await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        info!("Frame sink finished after {} frames", self.frames);
        if let Some(metadata) = self.metadata.as_mut() {
            metadata.flush().await?;
        }
        self.transport.terminate().await
    }

    async fn abort(&mut self) {
        self.transport.close().await;
    }
}

/// Telemetry sink handing encoded records to a shared writer task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<Vec<u8>>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<Vec<u8>>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn emit(&mut self, stamped: StampedReading) -> Result<()> {
        let document = encode_record(&stamped)?;
        self.sender
            .send(document)
            .await
            .map_err(|_| TelemetryError::Stream("record writer has stopped".to_string()))
    }

    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Spawn the single writer task owning `writer`
///
/// The task ends once every [`ChannelSink`] sender is dropped and returns the
/// number of records written.
pub fn spawn_record_writer<W>(mut writer: W, mut receiver: mpsc::Receiver<Vec<u8>>) -> JoinHandle<Result<u64>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut written = 0u64;
        while let Some(document) = receiver.recv().await {
            write_document(&mut writer, &document).await?;
            written += 1;
        }
        debug!("Record writer finished after {} records", written);
        Ok(written)
    })
}

/// Create a record channel with the default capacity
pub fn record_channel() -> (mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
    mpsc::channel(RECORD_CHANNEL_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::DEFAULT_DECODER_MAX_PAYLOAD;
    use crate::protocol::record::FrameMetadata;
    use crate::stream::mocks::RecordingWriter;
    use crate::stream::FrameWriter;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    fn stamped(reading: Reading, index: u64) -> StampedReading {
        StampedReading {
            reading,
            timestamp_ms: 1_000,
            index,
        }
    }

    /// Transport recording every call
    #[derive(Clone, Default)]
    struct RecordingTransport {
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl FrameTransport for RecordingTransport {
        async fn send(&mut self, payload: &[u8]) -> Result<()> {
            self.calls.lock().unwrap().push(format!("send:{}", payload.len()));
            Ok(())
        }

        async fn terminate(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("terminate".to_string());
            Ok(())
        }

        async fn close(&mut self) {
            self.calls.lock().unwrap().push("close".to_string());
        }
    }

    #[tokio::test]
    async fn test_text_sink_writes_records() {
        let mut sink = TextSink::new(Vec::new());
        sink.emit(stamped(Reading::Proximity { distance_cm: 72.0 }, 0)).await.unwrap();
        sink.emit(stamped(Reading::Proximity { distance_cm: 70.5 }, 1)).await.unwrap();
        sink.finish().await.unwrap();
        assert_eq!(sink.records(), 2);

        let output = sink.into_inner();
        let documents: Vec<Value> = serde_json::Deserializer::from_slice(&output)
            .into_iter::<Value>()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0]["proximity"], 72.0);
        assert_eq!(documents[1]["index"], 1);
    }

    #[tokio::test]
    async fn test_text_sink_flushes_every_record() {
        let mock = tokio_test::io::Builder::new()
            .write(&encode_record(&stamped(Reading::Proximity { distance_cm: 1.5 }, 0)).unwrap())
            .build();
        let mut sink = TextSink::new(mock);

        sink.emit(stamped(Reading::Proximity { distance_cm: 1.5 }, 0)).await.unwrap();
    }

    #[tokio::test]
    async fn test_text_sink_flush_follows_each_record() {
        let recorder = RecordingWriter::new();
        let mut sink = TextSink::new(recorder.clone());
        let first = stamped(Reading::Proximity { distance_cm: 1.5 }, 0);
        let second = stamped(Reading::Proximity { distance_cm: 72.0 }, 1);
        let first_len = encode_record(&first).unwrap().len();
        let second_len = encode_record(&second).unwrap().len();

        sink.emit(first).await.unwrap();
        assert_eq!(recorder.get_events(), vec![format!("write:{}", first_len), "flush".to_string()]);

        sink.emit(second).await.unwrap();
        assert_eq!(
            recorder.get_events(),
            vec![
                format!("write:{}", first_len),
                "flush".to_string(),
                format!("write:{}", second_len),
                "flush".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_record_writer_flushes_each_document() {
        let recorder = RecordingWriter::new();
        let (sender, receiver) = record_channel();
        let handle = spawn_record_writer(recorder.clone(), receiver);

        sender.send(b"{}\n".to_vec()).await.unwrap();
        sender.send(b"{\"a\":1}\n".to_vec()).await.unwrap();
        drop(sender);

        assert_eq!(handle.await.unwrap().unwrap(), 2);
        assert_eq!(recorder.get_events(), vec!["write:3", "flush", "write:8", "flush"]);
    }

    #[tokio::test]
    async fn test_text_sink_rejects_images() {
        let mut sink = TextSink::new(Vec::new());
        let result = sink.emit(stamped(Reading::ImageFrame(b"abcd".to_vec()), 0)).await;
        assert!(matches!(result, Err(TelemetryError::UnsupportedReading(_))));
    }

    #[tokio::test]
    async fn test_frame_sink_sends_and_terminates() {
        let transport = RecordingTransport::default();
        let mut sink = FrameSink::new(transport.clone());

        sink.emit(stamped(Reading::ImageFrame(b"abcd".to_vec()), 0)).await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(sink.frames(), 1);
        assert_eq!(*transport.calls.lock().unwrap(), vec!["send:4", "terminate"]);
    }

    #[tokio::test]
    async fn test_frame_sink_abort_closes_without_terminator() {
        let transport = RecordingTransport::default();
        let mut sink = FrameSink::new(transport.clone());

        sink.emit(stamped(Reading::ImageFrame(b"abcd".to_vec()), 0)).await.unwrap();
        sink.abort().await;

        assert_eq!(*transport.calls.lock().unwrap(), vec!["send:4", "close"]);
    }

    #[tokio::test]
    async fn test_frame_sink_rejects_telemetry() {
        let mut sink = FrameSink::new(RecordingTransport::default());
        let result = sink.emit(stamped(Reading::Proximity { distance_cm: 1.0 }, 0)).await;
        assert!(matches!(result, Err(TelemetryError::UnsupportedReading("proximity"))));
    }

    #[tokio::test]
    async fn test_frame_sink_writes_metadata() {
        let (client, server) = tokio::io::duplex(1024);
        let mut sink = FrameSink::with_metadata(FrameWriter::new(server), Vec::new());

        sink.emit(stamped(Reading::ImageFrame(b"abcd".to_vec()), 7)).await.unwrap();
        sink.finish().await.unwrap();

        let mut client = client;
        let first = crate::protocol::decoder::read_frame(&mut client, DEFAULT_DECODER_MAX_PAYLOAD)
            .await
            .unwrap();
        assert!(matches!(first, crate::protocol::frame::FrameEvent::Data(_)));

        let metadata = sink.metadata.take().unwrap();
        let parsed: FrameMetadata = serde_json::from_slice(&metadata).unwrap();
        assert_eq!(parsed, FrameMetadata { timestamp: 1_000, index: 7 });
    }

    #[tokio::test]
    async fn test_channel_sinks_share_one_writer() {
        let (sender, receiver) = record_channel();
        let writer = spawn_record_writer(Vec::new(), receiver);

        let mut proximity = ChannelSink::new(sender.clone());
        let mut accelerometer = ChannelSink::new(sender);

        proximity.emit(stamped(Reading::Proximity { distance_cm: 72.0 }, 0)).await.unwrap();
        accelerometer
            .emit(stamped(Reading::Acceleration { x: 0.0, y: 0.0, z: 1.0 }, 0))
            .await
            .unwrap();
        proximity.emit(stamped(Reading::Proximity { distance_cm: 70.5 }, 1)).await.unwrap();

        drop(proximity);
        drop(accelerometer);
        assert_eq!(writer.await.unwrap().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_channel_sink_writer_gone() {
        let (sender, receiver) = record_channel();
        drop(receiver);
        let mut sink = ChannelSink::new(sender);

        let result = sink.emit(stamped(Reading::Proximity { distance_cm: 1.0 }, 0)).await;
        assert!(matches!(result, Err(TelemetryError::Stream(_))));
    }
}
