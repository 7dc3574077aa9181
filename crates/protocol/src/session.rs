use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{ChunkTotal, UploadProgress, UploadStatus};

/// Server-side record of one chunked upload.
///
/// `chunk_total`, `last_chunk_size_bytes` and `max_chunk_size` are fixed
/// when the session is prepared. Only `last_saved_chunk_index` and
/// `received_chunks` change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub session_id: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_type: String,
    pub total_size_bytes: u64,
    pub max_chunk_size: u64,
    pub chunk_total: ChunkTotal,
    pub last_chunk_size_bytes: u64,
    /// Highest chunk index persisted so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved_chunk_index: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub received_chunks: BTreeSet<u64>,
}

impl UploadSession {
    /// Returns `true` if `index` is the last chunk of a bounded session.
    pub fn is_final_chunk(&self, index: u64) -> bool {
        self.chunk_total.final_index() == Some(index)
    }

    /// Exact byte size expected for chunk `index`.
    ///
    /// Returns `None` for unbounded sessions and out-of-range indices.
    pub fn expected_chunk_size(&self, index: u64) -> Option<u64> {
        let total = self.chunk_total.count()?;
        if index >= total {
            None
        } else if index + 1 == total {
            Some(self.last_chunk_size_bytes)
        } else {
            Some(self.max_chunk_size)
        }
    }

    /// Records a persisted chunk and advances the watermark.
    pub fn record_chunk(&mut self, index: u64) {
        self.received_chunks.insert(index);
        let watermark = self
            .last_saved_chunk_index
            .map_or(index, |prev| prev.max(index));
        self.last_saved_chunk_index = Some(watermark);
    }

    /// Returns `true` once the upload needs no further chunks.
    ///
    /// Bounded sessions complete when every index has been received.
    /// Unbounded sessions complete as soon as any chunk is received.
    pub fn is_complete(&self) -> bool {
        match self.chunk_total {
            ChunkTotal::Bounded(n) => {
                n > 0
                    && self.received_chunks.len() as u64 == n
                    && self.received_chunks.iter().all(|&i| i < n)
            }
            ChunkTotal::Unbounded => !self.received_chunks.is_empty(),
        }
    }

    /// Indices not yet received, in ascending order.
    ///
    /// Always empty for unbounded sessions.
    pub fn missing_chunks(&self) -> Vec<u64> {
        match self.chunk_total {
            ChunkTotal::Bounded(n) => (0..n)
                .filter(|i| !self.received_chunks.contains(i))
                .collect(),
            ChunkTotal::Unbounded => Vec::new(),
        }
    }

    /// Bytes accounted for by the received chunks.
    pub fn received_bytes(&self) -> u64 {
        match self.chunk_total {
            ChunkTotal::Bounded(_) => self
                .received_chunks
                .iter()
                .filter_map(|&i| self.expected_chunk_size(i))
                .sum(),
            ChunkTotal::Unbounded if self.is_complete() => self.total_size_bytes,
            ChunkTotal::Unbounded => 0,
        }
    }

    pub fn status(&self) -> UploadStatus {
        if self.is_complete() {
            UploadStatus::Completed
        } else if self.received_chunks.is_empty() {
            UploadStatus::Pending
        } else {
            UploadStatus::InProgress
        }
    }

    /// Returns current progress as a protocol-compatible struct.
    pub fn progress(&self) -> UploadProgress {
        UploadProgress {
            session_id: self.session_id.clone(),
            status: self.status(),
            total_bytes: self.total_size_bytes,
            received_bytes: self.received_bytes(),
            received_chunks: self.received_chunks.len() as u64,
            chunk_total: self.chunk_total.count(),
        }
    }
}
