use std::collections::BTreeSet;

use chunkload_protocol::{ChunkTotal, FileMeta, UploadSession};
use tracing::info;

use crate::validation::validate_path_component;
use crate::{SessionStore, UploadError, UploaderConfig};

/// Chunk arithmetic for a file of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    pub chunk_total: ChunkTotal,
    /// Size of the final chunk; always in `1..=max_chunk_size`.
    pub last_chunk_size_bytes: u64,
}

/// Splits `file_size` into chunks of at most `max_chunk_size` bytes.
///
/// `chunk_total = ceil(file_size / max_chunk_size)` and the final chunk
/// holds the remainder, or a full chunk when the size divides evenly.
pub fn chunk_layout(
    file_size: u64,
    max_chunk_size: u64,
    ignore_chunk_total: bool,
) -> Result<ChunkLayout, UploadError> {
    if max_chunk_size == 0 {
        return Err(UploadError::InvalidConfig(
            "maxChunkSize must be greater than zero".into(),
        ));
    }
    if file_size == 0 {
        return Err(UploadError::InvalidFileSize(file_size));
    }

    let total = file_size.div_ceil(max_chunk_size);
    let last_chunk_size_bytes = file_size - (total - 1) * max_chunk_size;
    let chunk_total = if ignore_chunk_total {
        ChunkTotal::Unbounded
    } else {
        ChunkTotal::Bounded(total)
    };

    Ok(ChunkLayout {
        chunk_total,
        last_chunk_size_bytes,
    })
}

/// Generates a fresh session id (UUID v4, 32 lowercase hex characters).
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Builds a new session record for `meta` without persisting it.
///
/// With `assemble_chunks_after_last` the file name is checked here, since
/// it becomes the output path once the last chunk arrives.
pub fn new_session(meta: &FileMeta, config: &UploaderConfig) -> Result<UploadSession, UploadError> {
    if config.assemble_chunks_after_last {
        validate_path_component(&meta.file_name)?;
    }
    let layout = chunk_layout(
        meta.file_size_bytes,
        config.max_chunk_size,
        config.ignore_chunk_total,
    )?;

    Ok(UploadSession {
        session_id: generate_session_id(),
        file_name: meta.file_name.clone(),
        file_type: meta.file_type.clone(),
        total_size_bytes: meta.file_size_bytes,
        max_chunk_size: config.max_chunk_size,
        chunk_total: layout.chunk_total,
        last_chunk_size_bytes: layout.last_chunk_size_bytes,
        last_saved_chunk_index: None,
        received_chunks: BTreeSet::new(),
    })
}

/// Creates a session for `meta` and persists it.
///
/// The returned `session_id` is the handle the client presents with every
/// chunk. No directory is created here; the temp directory appears with the
/// first chunk.
pub async fn prepare_upload(
    store: &dyn SessionStore,
    config: &UploaderConfig,
    meta: &FileMeta,
) -> Result<UploadSession, UploadError> {
    let session = new_session(meta, config)?;
    store.set(&session.session_id, session.clone()).await?;

    info!(
        session_id = %session.session_id,
        file_name = %session.file_name,
        size = session.total_size_bytes,
        chunks = ?session.chunk_total.count(),
        "upload session prepared"
    );
    Ok(session)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::MemoryStore;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn ten_mib_in_three_mib_chunks() {
        let layout = chunk_layout(10 * MIB, 3 * MIB, false).unwrap();
        assert_eq!(layout.chunk_total, ChunkTotal::Bounded(4));
        assert_eq!(layout.last_chunk_size_bytes, MIB);
    }

    #[test]
    fn exact_multiple_has_full_last_chunk() {
        let layout = chunk_layout(12, 4, false).unwrap();
        assert_eq!(layout.chunk_total, ChunkTotal::Bounded(3));
        assert_eq!(layout.last_chunk_size_bytes, 4);
    }

    #[test]
    fn file_smaller_than_chunk() {
        let layout = chunk_layout(3, 4, false).unwrap();
        assert_eq!(layout.chunk_total, ChunkTotal::Bounded(1));
        assert_eq!(layout.last_chunk_size_bytes, 3);
    }

    #[test]
    fn layout_invariants_hold() {
        for max in 1..=17u64 {
            for size in 1..=200u64 {
                let layout = chunk_layout(size, max, false).unwrap();
                let total = layout.chunk_total.count().unwrap();
                assert_eq!(total, size.div_ceil(max));
                assert!(layout.last_chunk_size_bytes > 0);
                assert!(layout.last_chunk_size_bytes <= max);
                assert_eq!((total - 1) * max + layout.last_chunk_size_bytes, size);
            }
        }
    }

    #[test]
    fn ignore_chunk_total_is_unbounded() {
        let layout = chunk_layout(10, 4, true).unwrap();
        assert_eq!(layout.chunk_total, ChunkTotal::Unbounded);
    }

    #[test]
    fn empty_file_rejected() {
        assert!(matches!(
            chunk_layout(0, 4, false),
            Err(UploadError::InvalidFileSize(0))
        ));
    }

    #[test]
    fn session_ids_are_unique() {
        let ids: HashSet<String> = (0..1_000).map(|_| generate_session_id()).collect();
        assert_eq!(ids.len(), 1_000);
        assert!(ids.iter().all(|id| id.len() == 32));
    }

    #[tokio::test]
    async fn prepare_persists_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = MemoryStore::new();
        let config = UploaderConfig::new(4, dir.path().join("tmp"), dir.path().join("end"));
        let meta = FileMeta::new(10, "a.bin", "application/octet-stream");

        let session = prepare_upload(&store, &config, &meta).await.unwrap();
        assert_eq!(session.chunk_total, ChunkTotal::Bounded(3));
        assert_eq!(session.last_chunk_size_bytes, 2);
        assert_eq!(session.last_saved_chunk_index, None);
        assert_eq!(store.get(&session.session_id).await.unwrap(), session);
        assert!(!config.temp_dir_path.exists());
    }

    #[tokio::test]
    async fn auto_assembly_rejects_bad_file_name_up_front() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = MemoryStore::new();
        let config = UploaderConfig::new(4, dir.path().join("tmp"), dir.path().join("end"))
            .with_assemble_after_last(true);

        for name in ["a/b.bin", "..", ""] {
            let meta = FileMeta::new(10, name, "");
            let result = prepare_upload(&store, &config, &meta).await;
            assert!(matches!(result, Err(UploadError::InvalidPath(_))), "{name:?}");
        }
        assert!(store.is_empty().await);
    }

    #[test]
    fn file_name_unchecked_without_auto_assembly() {
        let config = UploaderConfig::new(4, "tmp", "end");
        let session = new_session(&FileMeta::new(10, "a/b.bin", ""), &config).unwrap();
        assert_eq!(session.file_name, "a/b.bin");
    }
}
