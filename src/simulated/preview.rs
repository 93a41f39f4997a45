use std::sync::Mutex;

use crate::capture::{MediaStream, PreviewSink};

#[derive(Debug, Default)]
struct PreviewState {
    stream: Option<MediaStream>,
    muted: bool,
    looping: bool,
    plays: usize,
    detaches: usize,
}

/// Preview sink that only remembers what it was told
#[derive(Debug, Default)]
pub struct MemoryPreviewSink {
    state: Mutex<PreviewState>,
    fail_play: bool,
}

impl MemoryPreviewSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose `play()` always fails
    pub fn failing_playback() -> Self {
        Self {
            fail_play: true,
            ..Self::default()
        }
    }

    pub fn current_stream(&self) -> Option<MediaStream> {
        self.state().stream.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.state().muted
    }

    pub fn is_looping(&self) -> bool {
        self.state().looping
    }

    pub fn plays(&self) -> usize {
        self.state().plays
    }

    /// Times the stream reference was cleared
    pub fn detaches(&self) -> usize {
        self.state().detaches
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PreviewState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PreviewSink for MemoryPreviewSink {
    fn set_stream(&self, stream: Option<MediaStream>) {
        let mut state = self.state();
        if stream.is_none() {
            state.detaches += 1;
        }
        state.stream = stream;
    }

    fn set_muted(&self, muted: bool) {
        self.state().muted = muted;
    }

    fn set_looping(&self, looping: bool) {
        self.state().looping = looping;
    }

    fn play(&self) -> Result<(), String> {
        if self.fail_play {
            return Err("autoplay blocked".to_string());
        }
        let mut state = self.state();
        if state.stream.is_none() {
            return Err("no stream attached".to_string());
        }
        state.plays += 1;
        Ok(())
    }
}
