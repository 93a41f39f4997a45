use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::capture::{CaptureError, DeviceAccessProvider, MediaStream, MediaTrack, StreamConstraints, TrackKind};

/// A track that records how often it was stopped
#[derive(Debug)]
pub struct SimulatedTrack {
    kind: TrackKind,
    label: String,
    live: AtomicBool,
    stop_calls: AtomicUsize,
}

impl SimulatedTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            live: AtomicBool::new(true),
            stop_calls: AtomicUsize::new(0),
        }
    }

    /// Number of times `stop()` was invoked
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl MediaTrack for SimulatedTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

enum Outcome {
    Grant,
    Deny(CaptureError),
}

/// Device provider that grants or denies synthetic streams.
///
/// A gated provider holds every request until [`release`](Self::release)
/// lets one through, in request order, to simulate a slow permission prompt.
pub struct SimulatedDevices {
    outcome: Mutex<Outcome>,
    gate: Option<Semaphore>,
    requests: AtomicUsize,
    issued: Mutex<Vec<(MediaStream, Vec<Arc<SimulatedTrack>>)>>,
}

impl SimulatedDevices {
    /// Grants every request immediately
    pub fn granting() -> Self {
        Self::with_outcome(Outcome::Grant, None)
    }

    /// Rejects every request with `err`
    pub fn denying(err: CaptureError) -> Self {
        Self::with_outcome(Outcome::Deny(err), None)
    }

    /// Grants requests only as they are released
    pub fn gated() -> Self {
        Self::with_outcome(Outcome::Grant, Some(Semaphore::new(0)))
    }

    fn with_outcome(outcome: Outcome, gate: Option<Semaphore>) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            gate,
            requests: AtomicUsize::new(0),
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Let the oldest pending request resolve
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Change the outcome of subsequent requests
    pub fn set_denial(&self, err: Option<CaptureError>) {
        let outcome = match err {
            Some(err) => Outcome::Deny(err),
            None => Outcome::Grant,
        };
        *lock(&self.outcome) = outcome;
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Every stream handed out so far, oldest first
    pub fn issued_streams(&self) -> Vec<MediaStream> {
        lock(&self.issued).iter().map(|(stream, _)| stream.clone()).collect()
    }

    /// Tracks of every stream handed out so far, oldest first
    pub fn issued_tracks(&self) -> Vec<Vec<Arc<SimulatedTrack>>> {
        lock(&self.issued).iter().map(|(_, tracks)| tracks.clone()).collect()
    }

    fn issue(&self, constraints: StreamConstraints) -> Result<MediaStream, CaptureError> {
        let mut tracks = Vec::new();
        if constraints.video {
            tracks.push(Arc::new(SimulatedTrack::new(TrackKind::Video, "Simulated Camera")));
        }
        if constraints.audio {
            tracks.push(Arc::new(SimulatedTrack::new(TrackKind::Audio, "Simulated Microphone")));
        }
        if tracks.is_empty() {
            return Err(CaptureError::Unsupported("no media kind requested".to_string()));
        }

        let stream = MediaStream::new(
            tracks
                .iter()
                .map(|track| Arc::clone(track) as Arc<dyn MediaTrack>)
                .collect(),
        );
        lock(&self.issued).push((stream.clone(), tracks));
        Ok(stream)
    }
}

#[async_trait::async_trait]
impl DeviceAccessProvider for SimulatedDevices {
    async fn request_stream(&self, constraints: StreamConstraints) -> Result<MediaStream, CaptureError> {
        let request = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(request, "Simulated device request");

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| CaptureError::Unknown("device gate closed".to_string()))?;
            permit.forget();
        }

        let denial = match &*lock(&self.outcome) {
            Outcome::Grant => None,
            Outcome::Deny(err) => Some(err.clone()),
        };

        match denial {
            Some(err) => Err(err),
            None => self.issue(constraints),
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
