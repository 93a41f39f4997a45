use serde::Serialize;
use thiserror::Error;

/// Failures observable through the session's `error` field.
///
/// These are never returned from `begin()`/`end()`; the controller records
/// them and moves the session to `error`.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum CaptureError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("no matching capture device")]
    DeviceNotFound,

    #[error("device busy: {0}")]
    DeviceBusy(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("recorder failed: {0}")]
    Recorder(String),

    #[error("recorder did not confirm stop within {0}ms")]
    StopTimeout(u64),

    #[error("unknown error accessing media devices: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// Whether this failure came from acquiring the device stream.
    pub fn is_device_access(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::DeviceNotFound | Self::DeviceBusy(_) | Self::Unsupported(_)
        )
    }
}
