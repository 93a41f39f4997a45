//! In-process capture collaborators for demos and tests
//!
//! These let the full session run without camera or microphone hardware,
//! making it suitable for CI environments.

mod devices;
mod preview;
mod recorder;

pub use devices::{SimulatedDevices, SimulatedTrack};
pub use preview::MemoryPreviewSink;
pub use recorder::{SegmentFeed, SimulatedRecorder, SimulatedRecorderConfig, SimulatedRecorderFactory};
