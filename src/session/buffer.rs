use tracing::debug;

use crate::capture::DataSegment;

/// Ordered, append-only accumulation of recorded segments
///
/// Tagged with the generation of the recording that owns it, so a collector
/// belonging to a superseded recording can never write into a newer one.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    generation: u64,
    segments: Vec<DataSegment>,
    total_bytes: usize,
    discarded: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty the buffer and hand ownership to `generation`
    pub fn reset(&mut self, generation: u64) {
        self.clear();
        self.generation = generation;
    }

    /// Append a segment in arrival order.
    ///
    /// Returns `false` when the segment is empty or belongs to another
    /// generation; neither changes the buffer.
    pub fn append(&mut self, generation: u64, segment: DataSegment) -> bool {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "Dropping segment from superseded recording"
            );
            return false;
        }

        if segment.is_empty() {
            self.discarded += 1;
            return false;
        }

        self.total_bytes += segment.len();
        self.segments.push(segment);
        true
    }

    /// Remove and return every buffered segment
    pub fn take(&mut self) -> Vec<DataSegment> {
        self.total_bytes = 0;
        std::mem::take(&mut self.segments)
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.total_bytes = 0;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Zero-length segments rejected since construction
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}
