use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chunkload_protocol::UploadSession;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{CHUNK_FILE_INFIX, SessionStore, UploadError};

// ---------------------------------------------------------------------------
// Temp file naming
// ---------------------------------------------------------------------------

/// Name of the temp file holding chunk `index` of a session.
pub fn chunk_file_name(session_id: &str, index: u64) -> String {
    format!("{session_id}{CHUNK_FILE_INFIX}{index}")
}

/// Extracts the chunk index from a temp file name of `session_id`.
///
/// Returns `None` for files that are not chunks of this session.
pub fn parse_chunk_index(session_id: &str, file_name: &str) -> Option<u64> {
    let digits = file_name
        .strip_prefix(session_id)?
        .strip_prefix(CHUNK_FILE_INFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

// ---------------------------------------------------------------------------
// ChunkWriter
// ---------------------------------------------------------------------------

/// Writes chunks into per-session temp directories under a root.
#[derive(Debug, Clone)]
pub struct ChunkWriter {
    temp_root: PathBuf,
}

impl ChunkWriter {
    /// Creates a writer rooted at `temp_root`.
    pub fn new(temp_root: &Path) -> Self {
        Self {
            temp_root: temp_root.to_path_buf(),
        }
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.temp_root.join(session_id)
    }

    pub fn chunk_path(&self, session_id: &str, index: u64) -> PathBuf {
        self.session_dir(session_id)
            .join(chunk_file_name(session_id, index))
    }

    /// Writes `data` as chunk `index`, replacing any earlier copy.
    ///
    /// The session directory must already exist.
    pub async fn write_chunk(
        &self,
        session_id: &str,
        index: u64,
        data: &[u8],
    ) -> Result<PathBuf, UploadError> {
        let path = self.chunk_path(session_id, index);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(UploadError::ChunkIo)?;
        file.write_all(data).await.map_err(UploadError::ChunkIo)?;
        file.flush().await.map_err(UploadError::ChunkIo)?;
        Ok(path)
    }

    /// Persists a validated chunk and records it on the session.
    ///
    /// The stored record is re-read after the write so progress recorded
    /// since `session` was fetched is kept. The returned snapshot is not
    /// written back; that is up to the caller.
    pub async fn save_chunk(
        &self,
        store: &dyn SessionStore,
        data: &[u8],
        index: u64,
        session: &UploadSession,
    ) -> Result<UploadSession, UploadError> {
        self.write_chunk(&session.session_id, index, data).await?;

        let mut current = store.get(&session.session_id).await?;
        current.record_chunk(index);

        debug!(
            session_id = %session.session_id,
            chunk_index = index,
            bytes = data.len(),
            received = current.received_chunks.len(),
            "chunk saved"
        );
        Ok(current)
    }

    /// Lists the chunk files of a session sorted by chunk index.
    ///
    /// Directory listing order is not numeric (`_10` sorts before `_2`) and
    /// not stable across filesystems, so the index is parsed from each name.
    /// Files that are not chunks of this session are skipped.
    pub async fn list_chunks(&self, session_id: &str) -> std::io::Result<Vec<(u64, PathBuf)>> {
        let mut entries = tokio::fs::read_dir(self.session_dir(session_id)).await?;
        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(index) = name
                .to_str()
                .and_then(|n| parse_chunk_index(session_id, n))
            else {
                continue;
            };
            if entry.file_type().await?.is_file() {
                chunks.push((index, entry.path()));
            }
        }
        chunks.sort_unstable_by_key(|(index, _)| *index);
        Ok(chunks)
    }

    /// Removes every chunk file of a session and then its directory.
    ///
    /// Returns the number of chunk files removed. A missing directory counts
    /// as already clean.
    pub async fn remove_chunks(&self, session_id: &str) -> std::io::Result<usize> {
        let chunks = match self.list_chunks(session_id).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        for (_, path) in &chunks {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        // Leave the directory alone if something else lives in it.
        match tokio::fs::remove_dir(self.session_dir(session_id)).await {
            Ok(()) => {}
            Err(e) => debug!(session_id, "temp directory kept: {e}"),
        }

        Ok(chunks.len())
    }
}
