use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::stream::MediaStream;

/// External live-display surface driven by the controller.
///
/// The controller is the only writer; it never reads the sink back.
pub trait PreviewSink: Send + Sync {
    /// Replace the displayed stream (`None` clears it)
    fn set_stream(&self, stream: Option<MediaStream>);

    fn set_muted(&self, muted: bool);

    fn set_looping(&self, looping: bool);

    /// Begin playback of the current stream
    fn play(&self) -> Result<(), String>;
}

/// How a live stream is presented on the preview sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    /// Mute self-view to prevent audio feedback
    pub muted: bool,
    pub looping: bool,
    pub autoplay: bool,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            muted: true,
            looping: true,
            autoplay: true,
        }
    }
}

/// Attach a live stream to the sink and start playback.
///
/// Playback failures are logged only; the preview is cosmetic and must not
/// fail the session.
pub fn attach_preview(sink: &dyn PreviewSink, stream: &MediaStream, settings: &PreviewSettings) {
    sink.set_stream(Some(stream.clone()));
    sink.set_muted(settings.muted);
    sink.set_looping(settings.looping);

    if settings.autoplay {
        if let Err(e) = sink.play() {
            warn!(stream_id = %stream.id(), "Preview playback failed: {}", e);
        }
    }

    debug!(stream_id = %stream.id(), "Preview attached");
}

pub fn detach_preview(sink: &dyn PreviewSink) {
    sink.set_stream(None);
    debug!("Preview detached");
}
