use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Media kinds requested from the device provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// One real-time track of a live stream.
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    /// Human-readable device label
    fn label(&self) -> &str;

    /// Stop the track and release its device. Must be idempotent.
    fn stop(&self);

    fn is_live(&self) -> bool;
}

/// Handle to a live audio/video stream.
///
/// Clones share the same tracks; stopping through any clone stops them all.
#[derive(Clone)]
pub struct MediaStream {
    id: Uuid,
    tracks: Arc<[Arc<dyn MediaTrack>]>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks: tracks.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    /// Stop every track of this stream
    pub fn stop_tracks(&self) {
        for track in self.tracks.iter() {
            track.stop();
        }
    }

    /// True while at least one track is still live
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(|track| track.is_live())
    }

    pub fn same_stream(&self, other: &MediaStream) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<TrackKind> = self.tracks.iter().map(|t| t.kind()).collect();
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &kinds)
            .field("active", &self.is_active())
            .finish()
    }
}
