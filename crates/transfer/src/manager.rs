//! Upload session lifecycle.
//!
//! [`ChunkedUploader`] is the entry point transports call. It owns the
//! session store, serializes work per session and runs
//! validate -> write -> update, assembling once the last missing chunk
//! arrives when configured to.

use std::path::PathBuf;
use std::sync::Arc;

use chunkload_protocol::{FileMeta, UploadSession};
use tracing::{info, warn};

use crate::locks::SessionLocks;
use crate::progress::{EventCallback, EventHub, UploadEvent};
use crate::validation::{validate_chunk, validate_path_component, validate_payload_len};
use crate::{ChunkWriter, MemoryStore, SessionStore, UploadError, UploaderConfig, assemble};

/// Chunked upload manager.
///
/// Safe to share across tasks (`Arc<ChunkedUploader>`). Calls for the same
/// session run one at a time; calls for different sessions run
/// concurrently.
pub struct ChunkedUploader {
    config: UploaderConfig,
    store: Arc<dyn SessionStore>,
    writer: ChunkWriter,
    locks: SessionLocks,
    events: EventHub,
}

impl ChunkedUploader {
    /// Creates an uploader backed by its own [`MemoryStore`].
    pub fn new(config: UploaderConfig) -> Result<Self, UploadError> {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Creates an uploader backed by a caller-supplied session store.
    pub fn with_store(
        config: UploaderConfig,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, UploadError> {
        config.validate()?;
        let writer = ChunkWriter::new(&config.temp_dir_path);
        Ok(Self {
            config,
            store,
            writer,
            locks: SessionLocks::new(),
            events: EventHub::new(),
        })
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Registers a callback for lifecycle events.
    pub fn on_event(&self, callback: EventCallback) {
        self.events.on_event(callback);
    }

    /// Creates and persists a session for a file about to be uploaded.
    pub async fn prepare_upload(&self, meta: FileMeta) -> Result<UploadSession, UploadError> {
        let session =
            crate::session::prepare_upload(self.store.as_ref(), &self.config, &meta).await?;
        self.events.emit(UploadEvent::Prepared {
            session_id: session.session_id.clone(),
            chunk_total: session.chunk_total,
        });
        Ok(session)
    }

    /// Validates and stores one chunk of an upload.
    ///
    /// Returns the updated session. When this chunk completes the upload the
    /// returned snapshot is the final state; the record is then removed from
    /// the store (after assembly, if `assemble_chunks_after_last` is set).
    /// An assembly failure is returned here and the record is kept, so the
    /// upload can be assembled again with [`assemble_chunks`](Self::assemble_chunks)
    /// or by re-sending a chunk.
    pub async fn process_chunk(
        &self,
        data: &[u8],
        chunk_index: u64,
        declared_size: u64,
        session_id: &str,
    ) -> Result<UploadSession, UploadError> {
        validate_path_component(session_id)?;
        let _guard = self.locks.lock(session_id).await;

        let session = self.store.get(session_id).await?;

        let checked = validate_chunk(
            &self.config,
            declared_size,
            chunk_index,
            session_id,
            &session,
        )
        .await
        .and_then(|()| validate_payload_len(declared_size, data.len()));
        if let Err(e) = checked {
            warn!(session_id, chunk_index, declared_size, "chunk rejected: {e}");
            return Err(e);
        }

        let session = self
            .writer
            .save_chunk(self.store.as_ref(), data, chunk_index, &session)
            .await?;

        if !session.is_complete() {
            self.store.set(session_id, session.clone()).await?;
            self.events.emit(UploadEvent::ChunkSaved {
                chunk_index,
                progress: session.progress(),
            });
            return Ok(session);
        }

        info!(
            session_id,
            file_name = %session.file_name,
            chunks = session.received_chunks.len(),
            "upload complete"
        );
        self.events.emit(UploadEvent::Completed {
            session_id: session.session_id.clone(),
            file_name: session.file_name.clone(),
        });

        if self.config.assemble_chunks_after_last && session.chunk_total.is_bounded() {
            if let Err(e) = self
                .assemble_locked(session_id, &session.file_name, Some(&session))
                .await
            {
                self.keep_for_retry(session_id, session, &e).await?;
                return Err(e);
            }
        }

        self.store.delete(session_id).await?;
        Ok(session)
    }

    /// Assembles the temp chunks of a session into the output file.
    ///
    /// Waits for any in-flight chunk of the same session. A session record
    /// is optional, so uploads completed without auto-assembly can be
    /// assembled after the fact. When a bounded record exists, every chunk
    /// file `0..chunk_total` must be on disk, and a complete record is
    /// deleted once assembly succeeds.
    pub async fn assemble_chunks(
        &self,
        session_id: &str,
        file_name: &str,
    ) -> Result<PathBuf, UploadError> {
        validate_path_component(session_id)?;
        let _guard = self.locks.lock(session_id).await;

        let record = match self.store.get(session_id).await {
            Ok(session) => Some(session),
            Err(UploadError::SessionNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        match self
            .assemble_locked(session_id, file_name, record.as_ref())
            .await
        {
            Ok(path) => {
                if record.as_ref().is_some_and(UploadSession::is_complete) {
                    self.store.delete(session_id).await?;
                }
                Ok(path)
            }
            Err(e) => {
                if let Some(session) = record {
                    self.keep_for_retry(session_id, session, &e).await?;
                }
                Err(e)
            }
        }
    }

    /// Deletes the temp chunks of a session without assembling them.
    pub async fn clear_chunks(&self, session_id: &str) -> Result<usize, UploadError> {
        validate_path_component(session_id)?;
        let _guard = self.locks.lock(session_id).await;
        assemble::clear_chunks(&self.config, session_id).await
    }

    /// Fetches the current state of a session.
    pub async fn get_session(&self, session_id: &str) -> Result<UploadSession, UploadError> {
        self.store.get(session_id).await
    }

    /// Chunk indices a resuming client still has to send.
    pub async fn missing_chunks(&self, session_id: &str) -> Result<Vec<u64>, UploadError> {
        Ok(self.store.get(session_id).await?.missing_chunks())
    }

    /// Abandons an upload: removes its temp chunks and its session record.
    ///
    /// Returns `true` if a session record existed.
    pub async fn discard_upload(&self, session_id: &str) -> Result<bool, UploadError> {
        validate_path_component(session_id)?;
        let _guard = self.locks.lock(session_id).await;

        let removed = assemble::clear_chunks(&self.config, session_id).await?;
        let existed = self.store.delete(session_id).await?;

        info!(session_id, removed, existed, "upload discarded");
        self.events.emit(UploadEvent::Discarded {
            session_id: session_id.to_string(),
        });
        Ok(existed)
    }

    /// Assembles with the session lock already held by the caller.
    async fn assemble_locked(
        &self,
        session_id: &str,
        file_name: &str,
        session: Option<&UploadSession>,
    ) -> Result<PathBuf, UploadError> {
        let result = match session.and_then(|s| s.chunk_total.count()) {
            Some(total) => {
                assemble::assemble_complete(&self.config, session_id, file_name, total).await
            }
            None => assemble::assemble_chunks(&self.config, session_id, file_name).await,
        };

        match result {
            Ok(path) => {
                self.events.emit(UploadEvent::Assembled {
                    session_id: session_id.to_string(),
                    path: path.clone(),
                });
                Ok(path)
            }
            Err(e) => {
                warn!(session_id, "assembly failed: {e}");
                self.events.emit(UploadEvent::AssemblyFailed {
                    session_id: session_id.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Stores `session` after a failed assembly.
    ///
    /// Chunk files found missing on disk are dropped from `received_chunks`
    /// so the client sees them in [`missing_chunks`](Self::missing_chunks)
    /// and sends them again.
    async fn keep_for_retry(
        &self,
        session_id: &str,
        mut session: UploadSession,
        error: &UploadError,
    ) -> Result<(), UploadError> {
        if let UploadError::MissingChunks { missing, .. } = error {
            for index in missing {
                session.received_chunks.remove(index);
            }
        }
        self.store.set(session_id, session).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ChunkedUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedUploader")
            .field("config", &self.config)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
