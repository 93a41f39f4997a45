use tokio::sync::mpsc;

use super::error::CaptureError;
use super::stream::MediaStream;

/// One incrementally produced unit of encoded recording data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    /// Encoded container bytes
    pub data: Vec<u8>,
    /// Milliseconds since the recorder started
    pub timestamp_ms: u64,
}

impl DataSegment {
    pub fn new(data: Vec<u8>, timestamp_ms: u64) -> Self {
        Self { data, timestamp_ms }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Events pushed by a running recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// A data segment became available
    Data(DataSegment),
    /// The recorder has flushed every pending segment and stopped.
    /// Emitted at most once; anything received after it is ignored.
    Stopped,
    /// The recorder failed and will produce nothing further
    Error(String),
}

/// Recorder bound to exactly one stream
///
/// Platform encoders implement this; the controller drives it.
#[async_trait::async_trait]
pub trait MediaRecorder: Send + Sync {
    /// Start recording
    ///
    /// Returns a channel receiver that will receive recorder events
    async fn start(&mut self) -> Result<mpsc::Receiver<RecorderEvent>, CaptureError>;

    /// Request a stop. Completion is confirmed by `RecorderEvent::Stopped`.
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Recorder name for logging
    fn name(&self) -> &str;
}

/// Creates recorders bound to a given stream
pub trait RecorderFactory: Send + Sync {
    fn create(&self, stream: &MediaStream) -> Result<Box<dyn MediaRecorder>, CaptureError>;
}
