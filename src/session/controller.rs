use super::buffer::ChunkBuffer;
use super::config::CaptureConfig;
use super::state::{SessionState, SessionStatus};
use super::stats::SessionStats;
use crate::capture::{
    attach_preview, detach_preview, CaptureError, DeviceAccessProvider, MediaRecorder, MediaStream,
    PreviewSettings, PreviewSink, RecorderEvent, RecorderFactory,
};
use crate::recording::FinalizedRecording;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How a segment collector finished
#[derive(Debug)]
enum CollectorExit {
    Stopped,
    Failed(CaptureError),
}

/// A started recorder plus the task draining its events into the buffer
struct ActiveRecording {
    recorder: Box<dyn MediaRecorder>,
    collector: JoinHandle<CollectorExit>,
    started_at: DateTime<Utc>,
}

impl ActiveRecording {
    /// Discard the recording: no more segments are collected
    async fn cancel(&mut self) {
        self.collector.abort();
        if let Err(e) = self.recorder.stop().await {
            warn!("Failed to stop recorder {}: {}", self.recorder.name(), e);
        }
    }
}

impl Drop for ActiveRecording {
    fn drop(&mut self) {
        self.collector.abort();
    }
}

/// The stream the session exclusively owns, with its recorder once started.
///
/// Dropping it stops every track and clears the preview sink, so every path
/// that gives up the stream performs the mandatory cleanup.
struct HeldStream {
    stream: MediaStream,
    recording: Option<ActiveRecording>,
    /// Set while `finish()` waits for the recorder to confirm its stop
    stopping: bool,
    preview: Arc<dyn PreviewSink>,
}

impl HeldStream {
    fn attach(stream: MediaStream, preview: Arc<dyn PreviewSink>, settings: &PreviewSettings) -> Self {
        attach_preview(preview.as_ref(), &stream, settings);
        Self {
            stream,
            recording: None,
            stopping: false,
            preview,
        }
    }

    fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    async fn stop_recorder(&mut self) {
        if let Some(mut recording) = self.recording.take() {
            recording.cancel().await;
        }
    }
}

impl Drop for HeldStream {
    fn drop(&mut self) {
        self.recording = None;
        self.stream.stop_tracks();
        detach_preview(self.preview.as_ref());
        info!(stream_id = %self.stream.id(), "Stream released");
    }
}

struct Inner {
    /// Incremented by every begin and teardown; a device grant for an older
    /// generation is stale
    generation: u64,
    held: Option<HeldStream>,
}

/// State shared between the controller and its collector tasks
struct Shared {
    inner: Mutex<Inner>,
    buffer: Mutex<ChunkBuffer>,
    state: watch::Sender<SessionState>,
    preview: Arc<dyn PreviewSink>,
    completed: AtomicU64,
}

impl Shared {
    fn publish(&self, state: SessionState) {
        match &state.error {
            Some(err) => info!(status = %state.status, "Session state changed: {}", err),
            None => info!(status = %state.status, "Session state changed"),
        }
        self.state.send_replace(state);
    }
}

/// Capture session controller
///
/// Owns at most one device stream and one recorder at a time. Failures are
/// never returned from `begin()`/`end()`; observe them through
/// [`status`](Self::status), [`error`](Self::error) or
/// [`subscribe`](Self::subscribe).
pub struct CaptureController {
    config: CaptureConfig,
    devices: Arc<dyn DeviceAccessProvider>,
    recorders: Arc<dyn RecorderFactory>,
    shared: Arc<Shared>,
}

impl CaptureController {
    /// Create a controller in the `idle` state
    pub fn new(
        config: CaptureConfig,
        devices: Arc<dyn DeviceAccessProvider>,
        recorders: Arc<dyn RecorderFactory>,
        preview: Arc<dyn PreviewSink>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());

        Self {
            config,
            devices,
            recorders,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    generation: 0,
                    held: None,
                }),
                buffer: Mutex::new(ChunkBuffer::new()),
                state,
                preview,
                completed: AtomicU64::new(0),
            }),
        }
    }

    /// Current status/error pair
    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.state.borrow().status
    }

    pub fn error(&self) -> Option<CaptureError> {
        self.shared.state.borrow().error.clone()
    }

    /// Receive every subsequent state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Acquire a stream, attach the preview and start recording.
    ///
    /// Any stream held from an earlier call is released first. Returns the
    /// live stream, or `None` when access failed (see [`error`](Self::error))
    /// or a later `begin()`/teardown superseded this one while permission
    /// was pending.
    pub async fn begin(&self) -> Option<MediaStream> {
        let generation = {
            let mut inner = self.shared.inner.lock().await;
            inner.generation += 1;

            if let Some(mut held) = inner.held.take() {
                warn!(
                    generation = inner.generation,
                    stream_id = %held.stream.id(),
                    "Preempting previously held stream"
                );
                held.stop_recorder().await;
                self.shared.buffer.lock().await.clear();
            }

            self.shared
                .publish(SessionState::new(SessionStatus::PermissionRequested));
            inner.generation
        };

        info!(generation, provider = self.devices.name(), "Requesting device access");
        let acquired = self.devices.request_stream(self.config.constraints).await;

        let mut inner = self.shared.inner.lock().await;

        if inner.generation != generation {
            if let Ok(stream) = &acquired {
                warn!(
                    generation,
                    current = inner.generation,
                    stream_id = %stream.id(),
                    "Discarding stream granted to a superseded request"
                );
                stream.stop_tracks();
            }
            return None;
        }

        let stream = match acquired {
            Ok(stream) => stream,
            Err(err) => {
                error!(generation, "Error accessing media devices: {}", err);
                self.shared.publish(SessionState::failed(err));
                return None;
            }
        };

        let mut held = HeldStream::attach(
            stream.clone(),
            Arc::clone(&self.shared.preview),
            &self.config.preview,
        );

        match self.start_recording(&stream, generation).await {
            Ok(recording) => {
                held.recording = Some(recording);
                inner.held = Some(held);
                info!(generation, stream_id = %stream.id(), "Recording started");
                self.shared.publish(SessionState::new(SessionStatus::Recording));
                Some(stream)
            }
            Err(err) => {
                error!(generation, "Failed to start recorder: {}", err);
                drop(held);
                self.shared.publish(SessionState::failed(err));
                None
            }
        }
    }

    async fn start_recording(
        &self,
        stream: &MediaStream,
        generation: u64,
    ) -> Result<ActiveRecording, CaptureError> {
        let mut recorder = self.recorders.create(stream)?;

        self.shared.buffer.lock().await.reset(generation);

        let events = recorder.start().await?;
        let collector = tokio::spawn(collect_segments(
            Arc::clone(&self.shared),
            generation,
            events,
        ));

        debug!(generation, recorder = recorder.name(), "Recorder bound to stream");

        Ok(ActiveRecording {
            recorder,
            collector,
            started_at: Utc::now(),
        })
    }

    /// Stop recording and return the encoded artifact as a data URI.
    ///
    /// Resolves with an empty string when nothing was recording, without
    /// waiting on anything.
    pub async fn end(&self) -> String {
        let Some(recording) = self.finish().await else {
            return String::new();
        };

        match recording.encode().await {
            Ok(uri) => uri,
            Err(e) => {
                error!("Failed to encode recording: {:#}", e);
                String::new()
            }
        }
    }

    /// Stop recording and return the finalized recording.
    ///
    /// `None` on the no-op path (nothing recording), when the recorder
    /// failed to confirm its stop, and when a `begin()` or teardown
    /// superseded the recording while it was stopping. The session lock is
    /// not held while waiting for the stop confirmation.
    pub async fn finish(&self) -> Option<FinalizedRecording> {
        let (generation, mut recording) = {
            let mut inner = self.shared.inner.lock().await;
            let status = self.status();

            if inner.held.as_ref().is_some_and(|held| held.stopping) {
                debug!(generation = inner.generation, "Stop already in progress, end is a no-op");
                return None;
            }

            let recording_now =
                status.is_recording() && inner.held.as_ref().is_some_and(HeldStream::is_recording);

            if !recording_now {
                if let Some(mut held) = inner.held.take() {
                    held.stop_recorder().await;
                }
                debug!(%status, "Nothing recording, end is a no-op");
                return None;
            }

            let generation = inner.generation;
            let held = inner.held.as_mut()?;
            held.stopping = true;
            (generation, held.recording.take()?)
        };

        info!(generation, "Stopping recorder");

        let exit = match recording.recorder.stop().await {
            Ok(()) => self.await_stop_confirmation(&mut recording).await,
            Err(err) => CollectorExit::Failed(err),
        };

        let mut inner = self.shared.inner.lock().await;

        if inner.generation != generation {
            warn!(
                generation,
                current = inner.generation,
                "Recording superseded while stopping, discarding it"
            );
            return None;
        }

        let held = inner.held.take();
        let segments = self.shared.buffer.lock().await.take();

        match exit {
            CollectorExit::Stopped => {
                let artifact = FinalizedRecording::assemble(
                    segments,
                    &self.config.container_mime_type,
                    recording.started_at,
                );
                drop(recording);
                drop(held);

                self.shared.completed.fetch_add(1, Ordering::SeqCst);
                info!(
                    generation,
                    bytes = artifact.len(),
                    segments = artifact.segment_count,
                    "Recording finalized"
                );
                self.shared.publish(SessionState::new(SessionStatus::Stopped));
                Some(artifact)
            }
            CollectorExit::Failed(err) => {
                error!(generation, "Recording lost: {}", err);
                drop(recording);
                drop(held);
                self.shared.publish(SessionState::failed(err));
                None
            }
        }
    }

    async fn await_stop_confirmation(&self, recording: &mut ActiveRecording) -> CollectorExit {
        match tokio::time::timeout(self.config.stop_timeout(), &mut recording.collector).await {
            Ok(Ok(exit)) => exit,
            Ok(Err(e)) => CollectorExit::Failed(CaptureError::Recorder(format!(
                "segment collector failed: {}",
                e
            ))),
            Err(_) => {
                warn!(
                    timeout_ms = self.config.stop_timeout_ms,
                    "Recorder did not confirm stop"
                );
                CollectorExit::Failed(CaptureError::StopTimeout(self.config.stop_timeout_ms))
            }
        }
    }

    /// Release everything the session holds without producing an artifact.
    ///
    /// Leaves `status`/`error` untouched and supersedes any pending device
    /// request.
    pub async fn shutdown(&self) {
        let mut inner = self.shared.inner.lock().await;
        inner.generation += 1;

        if let Some(mut held) = inner.held.take() {
            held.stop_recorder().await;
        }

        detach_preview(self.shared.preview.as_ref());
        self.shared.buffer.lock().await.clear();

        info!(generation = inner.generation, "Capture session torn down");
    }

    /// Whether a device stream is currently held
    pub async fn holds_stream(&self) -> bool {
        self.shared.inner.lock().await.held.is_some()
    }

    /// Whether a recorder is currently bound
    pub async fn holds_recorder(&self) -> bool {
        self.shared
            .inner
            .lock()
            .await
            .held
            .as_ref()
            .is_some_and(HeldStream::is_recording)
    }

    /// Get current session statistics
    pub async fn stats(&self) -> SessionStats {
        let (generation, recording_started_at) = {
            let inner = self.shared.inner.lock().await;
            let started_at = inner
                .held
                .as_ref()
                .and_then(|held| held.recording.as_ref())
                .map(|recording| recording.started_at);
            (inner.generation, started_at)
        };

        let buffer = self.shared.buffer.lock().await;
        let duration_secs = recording_started_at
            .map(|started| Utc::now().signed_duration_since(started).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            status: self.status(),
            generation,
            segments_buffered: buffer.len(),
            bytes_buffered: buffer.total_bytes(),
            segments_discarded: buffer.discarded(),
            recordings_completed: self.shared.completed.load(Ordering::SeqCst),
            recording_started_at,
            duration_secs,
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        match self.shared.inner.try_lock() {
            Ok(mut inner) => {
                inner.generation += 1;
                inner.held = None;
            }
            Err(_) => warn!("Controller dropped while its state was locked, skipping teardown"),
        }
        detach_preview(self.shared.preview.as_ref());
    }
}

/// Drain recorder events into the chunk buffer until the stop confirmation.
async fn collect_segments(
    shared: Arc<Shared>,
    generation: u64,
    mut events: mpsc::Receiver<RecorderEvent>,
) -> CollectorExit {
    while let Some(event) = events.recv().await {
        match event {
            RecorderEvent::Data(segment) => {
                let bytes = segment.len();
                if shared.buffer.lock().await.append(generation, segment) {
                    debug!(generation, bytes, "Segment buffered");
                }
            }
            RecorderEvent::Stopped => {
                debug!(generation, "Recorder confirmed stop");
                return CollectorExit::Stopped;
            }
            RecorderEvent::Error(reason) => {
                let err = CaptureError::Recorder(reason);
                tokio::spawn(fail_recording(Arc::clone(&shared), generation, err.clone()));
                return CollectorExit::Failed(err);
            }
        }
    }

    let err = CaptureError::Recorder("event stream closed before stop confirmation".to_string());
    tokio::spawn(fail_recording(Arc::clone(&shared), generation, err.clone()));
    CollectorExit::Failed(err)
}

/// Move a still-running recording of `generation` to `error`.
///
/// A no-op when `end()` already consumed the recording or a later
/// acquisition superseded it.
async fn fail_recording(shared: Arc<Shared>, generation: u64, err: CaptureError) {
    let mut inner = shared.inner.lock().await;

    if inner.generation != generation {
        return;
    }

    let owns_recording = inner.held.as_ref().is_some_and(HeldStream::is_recording);
    if !owns_recording {
        return;
    }

    error!(generation, "Recorder failed while recording: {}", err);
    inner.held = None;
    shared.buffer.lock().await.clear();
    shared.publish(SessionState::failed(err));
}
