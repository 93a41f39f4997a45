//! Finalization of recorded segments into a transportable artifact

mod finalize;

pub use finalize::{decode_data_uri, DecodedArtifact, FinalizedRecording, RecordingMetadata, DEFAULT_CONTAINER_MIME};
