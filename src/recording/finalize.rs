use anyhow::{bail, Context, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capture::DataSegment;

/// Container mime-type every finalized recording is tagged with
pub const DEFAULT_CONTAINER_MIME: &str = "video/webm";

/// The complete artifact assembled from all segments of one recording
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedRecording {
    pub id: Uuid,
    pub mime_type: String,
    /// Concatenation of every segment, in arrival order
    pub data: Vec<u8>,
    pub segment_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Everything about a recording except its bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: Uuid,
    pub mime_type: String,
    pub byte_len: usize,
    pub segment_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Result of decoding a data URI produced by [`FinalizedRecording::data_uri`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedArtifact {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl FinalizedRecording {
    /// Concatenate `segments` into one blob tagged with `mime_type`
    pub fn assemble(segments: Vec<DataSegment>, mime_type: &str, started_at: DateTime<Utc>) -> Self {
        let total: usize = segments.iter().map(DataSegment::len).sum();
        let segment_count = segments.len();

        let mut data = Vec::with_capacity(total);
        for segment in segments {
            data.extend_from_slice(&segment.data);
        }

        Self {
            id: Uuid::new_v4(),
            mime_type: mime_type.to_string(),
            data,
            segment_count,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Render as `data:<mime>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        let payload = base64::engine::general_purpose::STANDARD.encode(&self.data);
        format!("data:{};base64,{}", self.mime_type, payload)
    }

    /// Render the data URI on a blocking worker.
    pub async fn encode(self) -> Result<String> {
        tokio::task::spawn_blocking(move || self.data_uri())
            .await
            .context("Artifact encoding task panicked")
    }

    pub fn metadata(&self) -> RecordingMetadata {
        RecordingMetadata {
            id: self.id,
            mime_type: self.mime_type.clone(),
            byte_len: self.data.len(),
            segment_count: self.segment_count,
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: self
                .finished_at
                .signed_duration_since(self.started_at)
                .num_milliseconds(),
        }
    }
}

/// Parse a base64 data URI back into its mime-type and bytes
pub fn decode_data_uri(uri: &str) -> Result<DecodedArtifact> {
    let rest = uri
        .strip_prefix("data:")
        .context("Missing data: scheme")?;

    let (header, payload) = rest
        .split_once(',')
        .context("Missing payload separator")?;

    let Some(mime_type) = header.strip_suffix(";base64") else {
        bail!("Only base64 data URIs are supported, got header {:?}", header);
    };

    let data = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .context("Invalid base64 payload")?;

    Ok(DecodedArtifact {
        mime_type: mime_type.to_string(),
        data,
    })
}
