use super::error::CaptureError;
use super::stream::{MediaStream, StreamConstraints};

/// Device access provider trait
///
/// Implementations may prompt the user out-of-band, so `request_stream`
/// can suspend for an arbitrary amount of time or never resolve.
#[async_trait::async_trait]
pub trait DeviceAccessProvider: Send + Sync {
    /// Request a live stream matching `constraints`
    async fn request_stream(&self, constraints: StreamConstraints) -> Result<MediaStream, CaptureError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
