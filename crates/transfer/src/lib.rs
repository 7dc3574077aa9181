//! Chunked uploads with resumable sessions and ordered assembly.
//!
//! A client prepares an upload, sends the file as independently indexed
//! chunks and the [`ChunkedUploader`] validates, persists and finally
//! assembles them into the output file.
//!
//! On-disk layout:
//!
//! - `<temp>/<session_id>/<session_id>_tmp_<index>` for received chunks
//! - `<end>/<session_id>/<file_name>` for the assembled file

mod assemble;
mod chunked;
mod config;
mod locks;
mod manager;
mod progress;
mod session;
mod store;
mod validation;

use std::path::PathBuf;

pub use assemble::{assemble_chunks, assemble_complete, clear_chunks};
pub use chunked::{ChunkWriter, chunk_file_name, parse_chunk_index};
pub use config::UploaderConfig;
pub use manager::ChunkedUploader;
pub use progress::{EventCallback, EventHub, UploadEvent};
pub use session::{ChunkLayout, chunk_layout, generate_session_id, new_session, prepare_upload};
pub use store::{JsonFileStore, MemoryStore, SessionStore, StoreFuture};
pub use validation::{ensure_dir, validate_chunk, validate_path_component, validate_payload_len};

pub use chunkload_protocol::{ChunkTotal, FileMeta, UploadProgress, UploadSession, UploadStatus};

/// Separator between session id and chunk index in temp file names.
pub const CHUNK_FILE_INFIX: &str = "_tmp_";

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("chunk of {size} bytes exceeds max chunk size of {max} bytes")]
    ChunkTooLarge { size: u64, max: u64 },

    #[error("chunk index {index} out of range (chunk total {total})")]
    ChunkIndexOutOfRange { index: u64, total: u64 },

    #[error("chunk declared for session {declared} does not belong to session {expected}")]
    SessionMismatch { declared: String, expected: String },

    #[error("last chunk must be exactly {expected} bytes, got {size}")]
    LastChunkSizeMismatch { size: u64, expected: u64 },

    #[error("chunk payload is {actual} bytes but {declared} were declared")]
    ChunkSizeMismatch { declared: u64, actual: u64 },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid file size: {0}")]
    InvalidFileSize(u64),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("failed to create directory {}: {source}", .path.display())]
    DirectoryCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("chunk I/O error: {0}")]
    ChunkIo(#[source] std::io::Error),

    #[error("no chunk files to assemble for session {0}")]
    NoChunks(String),

    #[error("session {session_id} is missing chunk files {missing:?}")]
    MissingChunks { session_id: String, missing: Vec<u64> },

    #[error("assembly I/O error: {0}")]
    AssemblyIo(#[source] std::io::Error),

    #[error("session store error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UploadError {
    /// Returns `true` for errors raised by chunk validation, before anything
    /// was written.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            UploadError::ChunkTooLarge { .. }
                | UploadError::ChunkIndexOutOfRange { .. }
                | UploadError::SessionMismatch { .. }
                | UploadError::LastChunkSizeMismatch { .. }
                | UploadError::ChunkSizeMismatch { .. }
        )
    }
}
