use serde::{Deserialize, Serialize};

/// Client-declared metadata for a file about to be uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub file_size_bytes: u64,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_type: String,
}

impl FileMeta {
    pub fn new(
        file_size_bytes: u64,
        file_name: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            file_size_bytes,
            file_name: file_name.into(),
            file_type: file_type.into(),
        }
    }
}

/// Number of chunks a session expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkTotal {
    /// Exactly this many chunks, indexed `0..n`.
    Bounded(u64),
    /// Chunk count is not tracked; every accepted chunk completes the upload.
    Unbounded,
}

impl ChunkTotal {
    /// Returns the chunk count, or `None` when unbounded.
    pub fn count(self) -> Option<u64> {
        match self {
            ChunkTotal::Bounded(n) => Some(n),
            ChunkTotal::Unbounded => None,
        }
    }

    /// Returns the index of the final chunk, or `None` when unbounded.
    pub fn final_index(self) -> Option<u64> {
        self.count().and_then(|n| n.checked_sub(1))
    }

    pub fn is_bounded(self) -> bool {
        matches!(self, ChunkTotal::Bounded(_))
    }
}

/// Current state of an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
}

/// Progress snapshot for an upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub session_id: String,
    pub status: UploadStatus,
    pub total_bytes: u64,
    pub received_bytes: u64,
    pub received_chunks: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_total: Option<u64>,
}

impl UploadProgress {
    /// Returns the upload progress as a percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.received_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}
