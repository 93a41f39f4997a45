use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capture::CaptureError;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle | stopped | error ──begin()──> permission-requested
/// permission-requested ──granted──> recording
/// permission-requested ──denied───> error
/// recording ──end()──> stopped
/// recording ──recorder failure──> error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    #[default]
    Idle,
    PermissionRequested,
    Recording,
    Stopped,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PermissionRequested => "permission-requested",
            Self::Recording => "recording",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable status/error pair published on every transition
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionState {
    pub status: SessionStatus,
    pub error: Option<CaptureError>,
}

impl SessionState {
    pub fn new(status: SessionStatus) -> Self {
        Self { status, error: None }
    }

    pub fn failed(error: CaptureError) -> Self {
        Self {
            status: SessionStatus::Error,
            error: Some(error),
        }
    }
}
