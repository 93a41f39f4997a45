use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::capture::{CaptureError, DataSegment, MediaRecorder, MediaStream, RecorderEvent, RecorderFactory};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The recorder's only event sender; taking it out closes the event stream
type SenderSlot = Arc<Mutex<Option<mpsc::Sender<RecorderEvent>>>>;

/// Behaviour of recorders created by [`SimulatedRecorderFactory`]
#[derive(Debug, Clone)]
pub struct SimulatedRecorderConfig {
    /// Emit a segment of `segment_bytes` at this interval while recording
    pub segment_interval: Option<Duration>,
    pub segment_bytes: usize,
    /// Segment emitted on stop, before the stop confirmation
    pub flush_on_stop: Option<Vec<u8>>,
    /// Send `RecorderEvent::Stopped` when stopped. Without it the event
    /// stream stays open until the recorder is dropped.
    pub confirm_stop: bool,
    pub fail_create: Option<CaptureError>,
    pub fail_start: Option<CaptureError>,
}

impl Default for SimulatedRecorderConfig {
    fn default() -> Self {
        Self {
            segment_interval: None,
            segment_bytes: 1024,
            flush_on_stop: None,
            confirm_stop: true,
            fail_create: None,
            fail_start: None,
        }
    }
}

/// Handle for pushing events into a running simulated recorder
#[derive(Debug, Clone)]
pub struct SegmentFeed {
    stream_id: Uuid,
    sender: SenderSlot,
    started: Instant,
}

impl SegmentFeed {
    /// Stream this recorder is bound to
    pub fn stream_id(&self) -> Uuid {
        self.stream_id
    }

    /// Deliver a data segment; `false` once the event stream is closed
    pub async fn push(&self, data: Vec<u8>) -> bool {
        let Some(tx) = current_sender(&self.sender) else {
            return false;
        };
        let timestamp_ms = self.started.elapsed().as_millis() as u64;
        tx.send(RecorderEvent::Data(DataSegment::new(data, timestamp_ms)))
            .await
            .is_ok()
    }

    /// Report a recorder failure
    pub async fn fail(&self, reason: &str) -> bool {
        let Some(tx) = current_sender(&self.sender) else {
            return false;
        };
        tx.send(RecorderEvent::Error(reason.to_string())).await.is_ok()
    }

    /// Close the event stream without a stop confirmation, as a crashed
    /// recorder would. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        lock(&self.sender).take().is_some()
    }

    pub fn is_open(&self) -> bool {
        lock(&self.sender).is_some()
    }
}

/// Creates [`SimulatedRecorder`]s and keeps count of the live ones
pub struct SimulatedRecorderFactory {
    config: SimulatedRecorderConfig,
    created: AtomicUsize,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    feeds: Arc<Mutex<Vec<SegmentFeed>>>,
}

impl SimulatedRecorderFactory {
    pub fn new(config: SimulatedRecorderConfig) -> Self {
        Self {
            config,
            created: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
            feeds: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Recorders started and not yet stopped or dropped
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live recorders observed
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Feeds whose event stream is still open
    pub fn open_feeds(&self) -> usize {
        lock(&self.feeds).iter().filter(|feed| feed.is_open()).count()
    }

    /// Feed of the most recently started recorder
    pub fn last_feed(&self) -> Option<SegmentFeed> {
        lock(&self.feeds).last().cloned()
    }
}

impl Default for SimulatedRecorderFactory {
    fn default() -> Self {
        Self::new(SimulatedRecorderConfig::default())
    }
}

impl RecorderFactory for SimulatedRecorderFactory {
    fn create(&self, stream: &MediaStream) -> Result<Box<dyn MediaRecorder>, CaptureError> {
        if let Some(err) = &self.config.fail_create {
            return Err(err.clone());
        }

        self.created.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SimulatedRecorder {
            stream_id: stream.id(),
            config: self.config.clone(),
            sender: Arc::new(Mutex::new(None)),
            running: false,
            ticker: None,
            started: None,
            live: Arc::clone(&self.live),
            max_live: Arc::clone(&self.max_live),
            feeds: Arc::clone(&self.feeds),
        }))
    }
}

/// Recorder producing synthetic container bytes
pub struct SimulatedRecorder {
    stream_id: Uuid,
    config: SimulatedRecorderConfig,
    sender: SenderSlot,
    running: bool,
    ticker: Option<JoinHandle<()>>,
    started: Option<Instant>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    feeds: Arc<Mutex<Vec<SegmentFeed>>>,
}

impl SimulatedRecorder {
    fn release(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        *lock(&self.sender) = None;
        if self.running {
            self.running = false;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl MediaRecorder for SimulatedRecorder {
    async fn start(&mut self) -> Result<mpsc::Receiver<RecorderEvent>, CaptureError> {
        if let Some(err) = &self.config.fail_start {
            return Err(err.clone());
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let started = Instant::now();
        *lock(&self.sender) = Some(tx);

        if let Some(interval) = self.config.segment_interval {
            let sender = Arc::clone(&self.sender);
            let segment_bytes = self.config.segment_bytes;
            self.ticker = Some(tokio::spawn(async move {
                let mut index: u8 = 0;
                loop {
                    tokio::time::sleep(interval).await;
                    let Some(tx) = current_sender(&sender) else {
                        break;
                    };
                    let segment = DataSegment::new(
                        vec![index; segment_bytes],
                        started.elapsed().as_millis() as u64,
                    );
                    if tx.send(RecorderEvent::Data(segment)).await.is_err() {
                        break;
                    }
                    index = index.wrapping_add(1);
                }
            }));
        }

        {
            let mut feeds = lock(&self.feeds);
            feeds.retain(SegmentFeed::is_open);
            feeds.push(SegmentFeed {
                stream_id: self.stream_id,
                sender: Arc::clone(&self.sender),
                started,
            });
        }

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        self.running = true;
        self.started = Some(started);

        debug!(stream_id = %self.stream_id, "Simulated recorder started");
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }

        if !self.config.confirm_stop {
            debug!(stream_id = %self.stream_id, "Simulated recorder ignoring stop");
            return Ok(());
        }

        // Waits for channel capacity: the confirmation must follow every segment
        if let Some(tx) = current_sender(&self.sender) {
            if let Some(flush) = self.config.flush_on_stop.clone() {
                let segment = DataSegment::new(flush, self.elapsed_ms());
                if tx.send(RecorderEvent::Data(segment)).await.is_err() {
                    warn!(stream_id = %self.stream_id, "Event receiver gone, flush segment dropped");
                }
            }
            if tx.send(RecorderEvent::Stopped).await.is_err() {
                warn!(stream_id = %self.stream_id, "Event receiver gone, stop confirmation dropped");
            }
        }

        self.release();
        debug!(stream_id = %self.stream_id, "Simulated recorder stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

impl Drop for SimulatedRecorder {
    fn drop(&mut self) {
        self.release();
    }
}

fn current_sender(slot: &SenderSlot) -> Option<mpsc::Sender<RecorderEvent>> {
    lock(slot).clone()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
