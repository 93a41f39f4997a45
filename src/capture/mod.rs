//! Collaborator contracts for a capture session
//!
//! The controller never talks to hardware directly. It consumes:
//! - a `DeviceAccessProvider` that grants a combined audio+video stream
//! - a `RecorderFactory` that binds one `MediaRecorder` to one stream
//! - a `PreviewSink` it attaches the live stream to and detaches on release

mod device;
mod error;
mod preview;
mod recorder;
mod stream;

pub use device::DeviceAccessProvider;
pub use error::CaptureError;
pub use preview::{attach_preview, detach_preview, PreviewSettings, PreviewSink};
pub use recorder::{DataSegment, MediaRecorder, RecorderEvent, RecorderFactory};
pub use stream::{MediaStream, MediaTrack, StreamConstraints, TrackKind};
