use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::SessionStatus;

/// Statistics about a capture session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Current status
    pub status: SessionStatus,

    /// Acquisition generation (incremented by every begin and teardown)
    pub generation: u64,

    /// Segments buffered for the current recording
    pub segments_buffered: usize,

    /// Bytes buffered for the current recording
    pub bytes_buffered: usize,

    /// Zero-length segments rejected so far
    pub segments_discarded: usize,

    /// Recordings finalized by this controller
    pub recordings_completed: u64,

    /// When the current recording started, if one is running
    pub recording_started_at: Option<DateTime<Utc>>,

    /// Seconds since the current recording started
    pub duration_secs: f64,
}
