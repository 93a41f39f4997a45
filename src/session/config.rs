use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::capture::{PreviewSettings, StreamConstraints};
use crate::recording::DEFAULT_CONTAINER_MIME;

/// Configuration for a capture session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Mime-type the finalized recording is tagged with
    /// Default: "video/webm"
    pub container_mime_type: String,

    /// How long `end()` waits for the recorder's stop confirmation
    /// Default: 10 seconds
    pub stop_timeout_ms: u64,

    /// Media requested from the device provider (audio + video)
    pub constraints: StreamConstraints,

    /// How the live stream is shown on the preview sink
    pub preview: PreviewSettings,
}

impl CaptureConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            container_mime_type: DEFAULT_CONTAINER_MIME.to_string(),
            stop_timeout_ms: 10_000,
            constraints: StreamConstraints::default(),
            preview: PreviewSettings::default(),
        }
    }
}
