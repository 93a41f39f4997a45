pub mod capture;
pub mod config;
pub mod recording;
pub mod session;
pub mod simulated;

pub use capture::{
    CaptureError, DataSegment, DeviceAccessProvider, MediaRecorder, MediaStream, MediaTrack,
    PreviewSettings, PreviewSink, RecorderEvent, RecorderFactory, StreamConstraints, TrackKind,
};
pub use config::Config;
pub use recording::{decode_data_uri, DecodedArtifact, FinalizedRecording, RecordingMetadata};
pub use session::{CaptureConfig, CaptureController, ChunkBuffer, SessionState, SessionStats, SessionStatus};
