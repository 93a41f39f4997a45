//! Capture session management
//!
//! This module provides the `CaptureController` state machine that manages:
//! - Device permission and stream acquisition
//! - Preview binding and teardown
//! - Recorder start/stop and segment accumulation
//! - Finalization of the recorded segments
//! - Observable session state and statistics

mod buffer;
mod config;
mod controller;
mod state;
mod stats;

pub use buffer::ChunkBuffer;
pub use config::CaptureConfig;
pub use controller::CaptureController;
pub use state::{SessionState, SessionStatus};
pub use stats::SessionStats;
